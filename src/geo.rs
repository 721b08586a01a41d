//! Geodesy utilities.
//!
//! Platform-agnostic distance and bearing computations shared by the
//! tracker, the radar and the JNI layer. All coordinates use WGS84
//! (lat/lon in degrees), elevations are meters.

use serde::{Deserialize, Serialize};

/// Earth radius in meters (WGS84 mean).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographic coordinate with optional elevation.
///
/// Common input to every distance and bearing function. Track points,
/// GPS fixes and peers are converted into this on the fly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimplePoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
}

impl SimplePoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, ele: None }
    }

    pub fn with_ele(lat: f64, lon: f64, ele: f64) -> Self {
        Self { lat, lon, ele: Some(ele) }
    }
}

/// A location fix as delivered by the GPS provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub ele: Option<f64>,
    /// Horizontal accuracy radius in meters, 0 when unknown.
    #[serde(default)]
    pub accuracy_m: f32,
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl GpsFix {
    /// Whether the fix is good enough to feed the tracker.
    ///
    /// The tracker itself never rejects fixes. Callers decide whether a
    /// fix with an unknown (zero) or coarse accuracy should be dropped.
    pub fn is_usable(&self, max_accuracy_m: f32) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
            && self.accuracy_m > 0.0
            && self.accuracy_m <= max_accuracy_m
    }
}

impl From<&GpsFix> for SimplePoint {
    fn from(fix: &GpsFix) -> Self {
        SimplePoint { lat: fix.lat, lon: fix.lon, ele: fix.ele }
    }
}

impl From<GpsFix> for SimplePoint {
    fn from(fix: GpsFix) -> Self {
        SimplePoint::from(&fix)
    }
}

/// Haversine surface distance between two points in meters.
pub fn haversine(a: &SimplePoint, b: &SimplePoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Elevation-aware distance in meters.
///
/// Combines the haversine surface distance with the elevation delta.
/// A missing elevation on either side counts as 0 m.
pub fn distance_3d(a: &SimplePoint, b: &SimplePoint) -> f64 {
    let surface = haversine(a, b);
    let dh = b.ele.unwrap_or(0.0) - a.ele.unwrap_or(0.0);
    (surface * surface + dh * dh).sqrt()
}

/// Initial great-circle bearing from `a` to `b` in degrees [0, 360).
///
/// Identical points have no direction; they yield 0.
pub fn bearing(a: &SimplePoint, b: &SimplePoint) -> f64 {
    if a.lat == b.lat && a.lon == b.lon {
        return 0.0;
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Distance (3D, meters) and initial bearing (degrees) from origin to target.
pub fn bearing_and_distance(origin: &SimplePoint, target: &SimplePoint) -> (f64, f64) {
    (distance_3d(origin, target), bearing(origin, target))
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shorter-arc difference between two angles, in [0, 180].
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = normalize_degrees(a - b);
    diff.min(360.0 - diff)
}

/// Offset a point by a distance along a bearing (spherical model).
///
/// Used to synthesize tracks and fixes at known distances.
pub fn destination(origin: &SimplePoint, bearing_deg: f64, distance_m: f64) -> SimplePoint {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    SimplePoint {
        lat: lat2.to_degrees(),
        lon: (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0,
        ele: origin.ele,
    }
}
