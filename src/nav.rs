//! Track-following navigation.
//!
//! Decides, once per GPS fix, which track point the compass arrow should
//! aim at next. The only mutable state is the index resolved on the
//! previous fix, owned by a [`TrackFollower`] session. Everything else is a
//! pure function of the fix, the track and the prior index.
//!
//! Fixes are taken as given. Dropping inaccurate fixes or detecting
//! implausible jumps is the caller's job (see [`GpsFix::is_usable`]).
//!
//! [`GpsFix::is_usable`]: crate::geo::GpsFix::is_usable

use serde::Serialize;

use crate::config::NavConfig;
use crate::geo::{distance_3d, SimplePoint};
use crate::gpx::{Track, TrackPoint};
use crate::nearest::{nearest_points, NearPoint};

/// Progress of one track-following session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// No fix processed since the track was loaded or the session reset.
    Uninitialized,
    /// The index resolved on the previous fix.
    Tracking { current_index: usize },
}

/// Distances from the hiker to the points either side of a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionDistances {
    /// Distance to the point before the candidate.
    pub first_to_me: f64,
    /// Distance to the point after the candidate.
    pub last_to_me: f64,
}

/// Outcome of one tracker step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Advance {
    pub target_index: usize,
    pub target: TrackPoint,
    /// The target is the final track point.
    pub is_last: bool,
}

/// A single track-following session.
///
/// Not meant to be shared: one session per followed track, fed from one
/// location stream, one fix at a time.
#[derive(Debug, Clone)]
pub struct TrackFollower {
    track: Track,
    config: NavConfig,
    state: ProgressState,
}

impl TrackFollower {
    pub fn new(track: Track, config: NavConfig) -> Self {
        Self {
            track,
            config,
            state: ProgressState::Uninitialized,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            ProgressState::Uninitialized => None,
            ProgressState::Tracking { current_index } => Some(current_index),
        }
    }

    /// Forget the resolved index; the next fix is treated as the first.
    pub fn reset(&mut self) {
        self.state = ProgressState::Uninitialized;
    }

    /// Switch to another track and start over.
    pub fn load_track(&mut self, track: Track) {
        self.track = track;
        self.reset();
    }

    /// Process one fix and return the point to aim at.
    pub fn advance(&mut self, fix: &SimplePoint) -> Advance {
        let target_index = next_target(&self.track, fix, self.current_index(), &self.config);
        self.state = ProgressState::Tracking { current_index: target_index };

        Advance {
            target_index,
            target: self.track.points()[target_index],
            is_last: target_index == self.track.last_index(),
        }
    }
}

/// Resolve the index of the next target point for `fix`.
///
/// `prior` is the index returned for the previous fix, or `None` on the
/// first fix of a session.
pub fn next_target(track: &Track, fix: &SimplePoint, prior: Option<usize>, config: &NavConfig) -> usize {
    let points = track.points();
    let last = track.last_index();

    let candidate = match prior {
        None => initial_candidate(&nearest_points(fix, points), points.len(), config),
        Some(prior) => extract_nearest_point(track, fix, prior, config),
    };

    if candidate.index == 0 {
        log::trace!("at track start, aiming at point 1");
        return 1;
    }
    if candidate.index == last {
        log::trace!("at track end, holding point {last}");
        return last;
    }

    let threshold = config.track_point_threshold_m;
    if candidate.distance_to_user <= threshold {
        let mut index = candidate.index;
        loop {
            index += 1;
            if index > last {
                return last;
            }
            let distance = distance_3d(fix, &SimplePoint::from(&points[index]));
            if distance > threshold {
                log::trace!("reached point {}, aiming at {index}", candidate.index);
                return index;
            }
        }
    }

    choose_segment(points, fix, candidate)
}

/// Pick the candidate for the first fix of a session.
///
/// A nearest point near the end of the track on the very first fix usually
/// means the trail is a loop or the track does not match the position; a
/// candidate near the start is preferred then.
fn initial_candidate(candidates: &[NearPoint], len: usize, config: &NavConfig) -> NearPoint {
    let nearest = candidates[0];
    let tail_start = len - config.tail_window.min(len);

    if nearest.index >= tail_start {
        if let Some(head) = candidates.iter().find(|c| c.index < config.head_window) {
            log::debug!(
                "first fix nearest to tail point {}, starting from point {} instead",
                nearest.index,
                head.index
            );
            return *head;
        }
    }
    nearest
}

/// Nearest track point to `fix` that is consistent with the prior index.
///
/// Where two parts of a trail run close together, the physically nearest
/// point may belong to the wrong part; the prior index is used to stay on
/// the one the hiker is actually walking.
pub fn extract_nearest_point(track: &Track, fix: &SimplePoint, prior: usize, config: &NavConfig) -> NearPoint {
    let candidates = nearest_points(fix, track.points());
    select_candidate(&candidates, prior, config)
}

/// Candidate selection over a distance-sorted, non-empty candidate list.
pub fn select_candidate(candidates: &[NearPoint], prior: usize, config: &NavConfig) -> NearPoint {
    let nearest = candidates[0];
    let low = prior.saturating_sub(config.behind_tolerance);
    let high = prior.saturating_add(config.ahead_tolerance);
    let in_window = |c: &NearPoint| (low..=high).contains(&c.index);

    if in_window(&nearest) {
        return nearest;
    }

    let min_index = candidates.iter().map(|c| c.index).min().unwrap_or(nearest.index);
    let max_index = candidates.iter().map(|c| c.index).max().unwrap_or(nearest.index);
    if max_index - min_index < config.cluster_spread {
        return nearest;
    }

    if let Some(candidate) = candidates.iter().find(|c| in_window(*c)) {
        log::debug!(
            "nearest point {} skipped, keeping continuity at {} (prior {prior})",
            nearest.index,
            candidate.index
        );
        return *candidate;
    }

    // Equal index distance keeps the physically nearer candidate, which
    // comes first in the sorted list.
    let closest = candidates
        .iter()
        .min_by_key(|c| c.index.abs_diff(prior))
        .copied()
        .unwrap_or(nearest);
    log::debug!(
        "no candidate near prior {prior}, falling back to index {} ({:.0} m away)",
        closest.index,
        closest.distance_to_user
    );
    closest
}

fn section_distances(points: &[TrackPoint], fix: &SimplePoint, index: usize) -> SectionDistances {
    SectionDistances {
        first_to_me: distance_3d(&SimplePoint::from(&points[index - 1]), fix),
        last_to_me: distance_3d(&SimplePoint::from(&points[index + 1]), fix),
    }
}

/// Aim at the candidate or the point after it, depending on which of the
/// two adjacent segments the hiker is closer to walking along.
///
/// The detour `(A + B) - X` is zero when the hiker stands on the segment
/// and grows as they move off it.
fn choose_segment(points: &[TrackPoint], fix: &SimplePoint, candidate: NearPoint) -> usize {
    let w = candidate.index;
    let sections = section_distances(points, fix, w);

    let to_candidate = candidate.distance_to_user;
    let incoming = points[w].distance_to_previous;
    let outgoing = points[w + 1].distance_to_previous;

    let offset_incoming = (to_candidate + sections.first_to_me) - incoming;
    let offset_outgoing = (to_candidate + sections.last_to_me) - outgoing;

    log::trace!(
        "point {w}: incoming detour {offset_incoming:.1} m, outgoing detour {offset_outgoing:.1} m"
    );

    if offset_incoming < offset_outgoing {
        w
    } else {
        w + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::destination;

    const ORIGIN: SimplePoint = SimplePoint { lat: 46.5, lon: 8.0, ele: None };

    /// Straight northbound track with evenly spaced points.
    fn straight_track(count: usize, spacing_m: f64) -> Track {
        let points = (0..count)
            .map(|i| destination(&ORIGIN, 0.0, i as f64 * spacing_m))
            .collect();
        Track::from_points(Some("straight".into()), points).unwrap()
    }

    fn config_with_threshold(threshold: f64) -> NavConfig {
        NavConfig {
            track_point_threshold_m: threshold,
            ..NavConfig::default()
        }
    }

    fn at(track: &Track, index: usize) -> SimplePoint {
        SimplePoint::from(&track.points()[index])
    }

    fn near(index: usize, distance_to_user: f64) -> NearPoint {
        NearPoint { index, distance_to_user }
    }

    #[test]
    fn first_fix_at_start_aims_at_second_point() {
        let track = straight_track(20, 50.0);
        let mut follower = TrackFollower::new(track.clone(), NavConfig::default());

        let step = follower.advance(&at(&track, 0));
        assert_eq!(step.target_index, 1);
        assert_eq!(step.target, track.points()[1]);
        assert!(!step.is_last);
        assert_eq!(follower.state(), ProgressState::Tracking { current_index: 1 });
    }

    #[test]
    fn fix_on_point_consumes_it() {
        let track = straight_track(5, 100.0);
        let config = config_with_threshold(20.0);

        assert_eq!(next_target(&track, &at(&track, 2), None, &config), 3);
    }

    #[test]
    fn threshold_loop_skips_several_reached_points() {
        // Points 5 m apart: everything within 20 m is already reached
        let track = straight_track(12, 5.0);
        let config = config_with_threshold(20.0);
        let fix = destination(&ORIGIN, 0.0, 22.0);

        let target = next_target(&track, &fix, Some(3), &config);
        assert_eq!(target, 9);
    }

    #[test]
    fn past_the_end_holds_last_point() {
        let track = straight_track(5, 100.0);
        let config = config_with_threshold(20.0);
        let beyond = destination(&at(&track, 4), 0.0, 200.0);

        assert_eq!(next_target(&track, &beyond, Some(3), &config), 4);
    }

    #[test]
    fn end_to_end_session() {
        let track = straight_track(5, 100.0);
        let mut follower = TrackFollower::new(track.clone(), config_with_threshold(20.0));

        assert_eq!(follower.advance(&at(&track, 2)).target_index, 3);
        assert_eq!(follower.current_index(), Some(3));

        let beyond = destination(&at(&track, 4), 0.0, 200.0);
        let step = follower.advance(&beyond);
        assert_eq!(step.target_index, 4);
        assert!(step.is_last);
    }

    #[test]
    fn terminal_plateau_is_stable() {
        let track = straight_track(5, 100.0);
        let mut follower = TrackFollower::new(track.clone(), NavConfig::default());

        for _ in 0..3 {
            let step = follower.advance(&at(&track, 4));
            assert_eq!(step.target_index, 4);
            assert!(step.is_last);
        }

        let long = straight_track(30, 40.0);
        for prior in [2, 15, 27, 29] {
            assert_eq!(next_target(&long, &at(&long, 29), Some(prior), &NavConfig::default()), 29);
        }
    }

    #[test]
    fn walking_the_track_never_regresses() {
        let track = straight_track(15, 50.0);
        let mut follower = TrackFollower::new(track.clone(), config_with_threshold(20.0));

        let mut previous = 0;
        let mut walked = 0.0;
        while walked <= 15.0 * 50.0 {
            let step = follower.advance(&destination(&ORIGIN, 0.0, walked));
            assert!(
                step.target_index >= previous,
                "regressed from {previous} to {} at {walked} m",
                step.target_index
            );
            previous = step.target_index;
            walked += 7.0;
        }
        assert_eq!(previous, 14);
    }

    #[test]
    fn between_points_aims_ahead() {
        let track = straight_track(10, 100.0);
        let config = config_with_threshold(20.0);

        // 60 m: nearest is point 1 and the hiker is still approaching it
        assert_eq!(next_target(&track, &destination(&ORIGIN, 0.0, 60.0), Some(1), &config), 1);
        // 130 m: nearest is point 1 but it lies behind
        assert_eq!(next_target(&track, &destination(&ORIGIN, 0.0, 130.0), Some(1), &config), 2);
    }

    #[test]
    fn first_fix_near_tail_starts_from_head() {
        let track = straight_track(20, 50.0);
        let config = NavConfig::default();

        let target = next_target(&track, &at(&track, 18), None, &config);
        assert_eq!(target, 5);
    }

    #[test]
    fn loop_track_starts_at_beginning() {
        // Square loop whose last point sits just short of the first
        let mut points: Vec<SimplePoint> = Vec::new();
        let mut cursor = ORIGIN;
        for heading in [0.0, 90.0, 180.0, 270.0] {
            for _ in 0..4 {
                points.push(cursor);
                cursor = destination(&cursor, heading, 50.0);
            }
        }
        points.push(destination(&ORIGIN, 180.0, 2.0));
        let track = Track::from_points(Some("loop".into()), points).unwrap();

        let fix = destination(&ORIGIN, 180.0, 3.0);
        let mut follower = TrackFollower::new(track, NavConfig::default());
        assert_eq!(follower.advance(&fix).target_index, 1);
    }

    /// Out-and-back trail: points 0..9 head north, 10..19 return 3 m to the east.
    /// Northbound leg of `count` points, then the same points in reverse
    /// 3 m to the east.
    fn out_and_back(count: usize, spacing_m: f64) -> Track {
        let outbound: Vec<SimplePoint> = (0..count)
            .map(|i| destination(&ORIGIN, 0.0, i as f64 * spacing_m))
            .collect();
        let inbound: Vec<SimplePoint> = outbound
            .iter()
            .rev()
            .map(|p| destination(p, 90.0, 3.0))
            .collect();
        Track::from_points(Some("out and back".into()), [outbound, inbound].concat()).unwrap()
    }

    #[test]
    fn parallel_trail_keeps_continuity() {
        let track = out_and_back(10, 20.0);
        // Half a meter from inbound point 16, 2.5 m from outbound point 3
        let fix = destination(&at(&track, 3), 90.0, 2.5);
        let config = config_with_threshold(10.0);

        assert_eq!(nearest_points(&fix, track.points())[0].index, 16);
        assert_eq!(extract_nearest_point(&track, &fix, 3, &config).index, 3);
        assert_eq!(next_target(&track, &fix, Some(3), &config), 4);
    }

    #[test]
    fn dense_parallel_trail_stays_on_outbound_leg() {
        // Sampled every meter, so the five nearest points all sit on the return leg
        let track = out_and_back(40, 1.0);
        // Half a meter from inbound point 69, 2.5 m from outbound point 10
        let fix = destination(&at(&track, 10), 90.0, 2.5);
        let config = NavConfig::default();

        let nearest: Vec<usize> = nearest_points(&fix, track.points())
            .iter()
            .take(5)
            .map(|n| n.index)
            .collect();
        assert!(nearest.iter().all(|&i| i >= 40), "nearest five: {nearest:?}");

        assert_eq!(extract_nearest_point(&track, &fix, 10, &config).index, 10);
        // Points up to 29 lie within 20 m of the fix
        assert_eq!(next_target(&track, &fix, Some(10), &config), 30);
    }

    #[test]
    fn select_accepts_nearest_inside_window() {
        let config = NavConfig::default();
        let candidates = [near(6, 1.0), near(30, 2.0), near(5, 3.0)];
        assert_eq!(select_candidate(&candidates, 3, &config).index, 6);
        // One behind the prior still counts
        let candidates = [near(2, 1.0), near(30, 2.0)];
        assert_eq!(select_candidate(&candidates, 3, &config).index, 2);
    }

    #[test]
    fn select_accepts_tight_cluster_outside_window() {
        let config = NavConfig::default();
        let candidates = [near(10, 1.0), near(11, 2.0), near(9, 3.0), near(12, 4.0), near(8, 5.0)];
        assert_eq!(select_candidate(&candidates, 3, &config).index, 10);
    }

    #[test]
    fn select_searches_window_before_fallback() {
        let config = NavConfig::default();
        let candidates = [near(40, 1.0), near(41, 2.0), near(7, 3.0), near(39, 4.0)];
        assert_eq!(select_candidate(&candidates, 5, &config).index, 7);
    }

    #[test]
    fn select_falls_back_to_closest_index() {
        let config = NavConfig::default();
        let candidates = [near(20, 1.0), near(3, 2.0), near(14, 3.0), near(2, 4.0), near(21, 5.0)];
        // Window is 7..=11; index 3 is 5 away from the prior, 14 is 6 away
        assert_eq!(select_candidate(&candidates, 8, &config).index, 3);
    }

    #[test]
    fn select_fallback_tie_prefers_physically_nearer() {
        let config = NavConfig::default();
        // Window is 9..=13; indices 3 and 17 are both 7 away from the prior
        let candidates = [near(20, 1.0), near(3, 2.0), near(17, 3.0), near(0, 4.0)];
        assert_eq!(select_candidate(&candidates, 10, &config).index, 3);

        let candidates = [near(20, 1.0), near(17, 2.0), near(3, 3.0), near(0, 4.0)];
        assert_eq!(select_candidate(&candidates, 10, &config).index, 17);
    }

    #[test]
    fn reset_and_reload_return_to_uninitialized() {
        let track = straight_track(5, 100.0);
        let mut follower = TrackFollower::new(track.clone(), NavConfig::default());

        follower.advance(&at(&track, 1));
        assert!(follower.current_index().is_some());
        follower.reset();
        assert_eq!(follower.state(), ProgressState::Uninitialized);

        follower.advance(&at(&track, 1));
        follower.load_track(straight_track(8, 30.0));
        assert_eq!(follower.current_index(), None);
        assert_eq!(follower.track().len(), 8);
    }

    #[test]
    fn section_distances_surround_candidate() {
        let track = straight_track(5, 100.0);
        let fix = destination(&ORIGIN, 0.0, 150.0);
        let sections = section_distances(track.points(), &fix, 2);
        assert!((sections.first_to_me - 50.0).abs() < 0.01);
        assert!((sections.last_to_me - 150.0).abs() < 0.01);
    }
}
