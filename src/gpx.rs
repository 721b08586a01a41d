//! GPX track loading.
//!
//! Wraps the `gpx` crate and turns tracks and routes into navigation-ready
//! [`Track`] values: an ordered point list with the length of every segment
//! precomputed, so the tracker never has to recompute it per fix.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{Error, Result};
use crate::geo::{distance_3d, SimplePoint};

/// A single sample of a loaded trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
    /// Length of the segment ending at this point, in meters. 0 for the first point.
    pub distance_to_previous: f64,
}

impl From<&TrackPoint> for SimplePoint {
    fn from(p: &TrackPoint) -> Self {
        SimplePoint { lat: p.lat, lon: p.lon, ele: p.ele }
    }
}

/// An ordered, immutable trail with at least two points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    points: Vec<TrackPoint>,
}

impl Track {
    /// Build a track from raw coordinates, precomputing segment lengths.
    pub fn from_points(name: Option<String>, points: Vec<SimplePoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::TooFewPoints { count: points.len() });
        }

        let mut previous: Option<SimplePoint> = None;
        let points = points
            .into_iter()
            .map(|p| {
                let distance_to_previous = previous.map_or(0.0, |prev| distance_3d(&prev, &p));
                previous = Some(p);
                TrackPoint {
                    lat: p.lat,
                    lon: p.lon,
                    ele: p.ele,
                    distance_to_previous,
                }
            })
            .collect();

        Ok(Track { name, points })
    }

    /// Wrap track points whose segment lengths were computed elsewhere.
    ///
    /// The distances are trusted as given.
    pub fn from_track_points(name: Option<String>, points: Vec<TrackPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::TooFewPoints { count: points.len() });
        }
        Ok(Track { name, points })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Never true for a constructed track.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.points.len() - 1
    }

    /// Total length of the track in meters.
    pub fn length_m(&self) -> f64 {
        self.points.iter().map(|p| p.distance_to_previous).sum()
    }

    /// Distance along the track from the start up to `index`, in meters.
    pub fn distance_along_m(&self, index: usize) -> f64 {
        self.points
            .iter()
            .take(index + 1)
            .map(|p| p.distance_to_previous)
            .sum()
    }
}

/// Parse every navigable track and route from a GPX document.
///
/// Multi-segment tracks are flattened into one point list. Tracks and
/// routes with fewer than two points are skipped.
pub fn parse_tracks<R: Read>(reader: R) -> Result<Vec<Track>> {
    let gpx = gpx::read(reader)?;

    let to_simple = |wp: &gpx::Waypoint| SimplePoint {
        lat: wp.point().y(),
        lon: wp.point().x(),
        ele: wp.elevation,
    };

    let tracks = gpx.tracks.iter().map(|t| {
        let points = t
            .segments
            .iter()
            .flat_map(|seg| seg.points.iter())
            .map(to_simple)
            .collect::<Vec<_>>();
        (t.name.clone(), points)
    });

    let routes = gpx
        .routes
        .iter()
        .map(|r| (r.name.clone(), r.points.iter().map(to_simple).collect::<Vec<_>>()));

    let mut navigable = Vec::new();
    for (name, points) in tracks.chain(routes) {
        match Track::from_points(name, points) {
            Ok(track) => navigable.push(track),
            Err(e) => log::debug!("skipping GPX entry: {e}"),
        }
    }

    Ok(navigable)
}

/// Load the first navigable track (or route) from GPX bytes.
pub fn load_track(data: &[u8]) -> Result<Track> {
    let track = parse_tracks(data)?.into_iter().next().ok_or(Error::NoTrack)?;
    log::info!(
        "loaded track {:?}: {} points, {:.0} m",
        track.name(),
        track.len(),
        track.length_m()
    );
    Ok(track)
}

/// Load a track and return it as a JSON string.
pub fn load_track_json(data: &[u8]) -> Result<String> {
    let track = load_track(data)?;
    Ok(serde_json::to_string(&track)?)
}
