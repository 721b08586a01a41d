//! Nearest-point search over a track.

use serde::Serialize;

use crate::geo::{distance_3d, SimplePoint};
use crate::gpx::TrackPoint;

/// A track point index paired with its distance to the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearPoint {
    pub index: usize,
    pub distance_to_user: f64,
}

/// Every track point ordered by 3D distance to `position`.
///
/// Linear scan; trails of a few thousand points do not warrant a spatial
/// index. Equal distances keep the lower index first.
pub fn nearest_points(position: &SimplePoint, points: &[TrackPoint]) -> Vec<NearPoint> {
    let mut near: Vec<NearPoint> = points
        .iter()
        .enumerate()
        .map(|(index, p)| NearPoint {
            index,
            distance_to_user: distance_3d(position, &SimplePoint::from(p)),
        })
        .collect();

    near.sort_by(|a, b| {
        a.distance_to_user
            .total_cmp(&b.distance_to_user)
            .then(a.index.cmp(&b.index))
    });
    near
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(lat: f64, lon: f64) -> TrackPoint {
        TrackPoint { lat, lon, ele: None, distance_to_previous: 0.0 }
    }

    #[test]
    fn sorted_by_distance() {
        let points = vec![tp(47.0, 11.0), tp(47.01, 11.0), tp(47.02, 11.0)];
        let near = nearest_points(&SimplePoint::new(47.019, 11.0), &points);

        let order: Vec<usize> = near.iter().map(|n| n.index).collect();
        assert_eq!(order, vec![2, 1, 0]);
        assert!(near.windows(2).all(|w| w[0].distance_to_user <= w[1].distance_to_user));
    }

    #[test]
    fn ties_prefer_lower_index() {
        // The same coordinate appears twice, as on an out-and-back trail
        let points = vec![tp(47.0, 11.0), tp(47.01, 11.0), tp(47.0, 11.0)];
        let near = nearest_points(&SimplePoint::new(47.0, 11.0), &points);

        assert_eq!(near[0].index, 0);
        assert_eq!(near[1].index, 2);
        assert_eq!(near[0].distance_to_user, near[1].distance_to_user);
    }

    #[test]
    fn elevation_participates() {
        let points = vec![
            TrackPoint { lat: 47.0, lon: 11.0, ele: Some(500.0), distance_to_previous: 0.0 },
            TrackPoint { lat: 47.0005, lon: 11.0, ele: Some(0.0), distance_to_previous: 0.0 },
        ];
        // Directly above point 0 but 500 m higher than the user
        let near = nearest_points(&SimplePoint::with_ele(47.0, 11.0, 0.0), &points);
        assert_eq!(near[0].index, 1);
    }

    #[test]
    fn empty_track_has_no_candidates() {
        assert!(nearest_points(&SimplePoint::new(0.0, 0.0), &[]).is_empty());
    }
}
