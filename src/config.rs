//! Tunable parameters.
//!
//! Every struct deserializes from JSON with missing fields falling back to
//! the defaults below, so the watch app only sends what it overrides.
//!
//! The candidate-selection numbers in [`NavConfig`] are empirical trail
//! heuristics. They are kept configurable with their field-tested defaults
//! rather than derived from a model.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Track-progress tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavConfig {
    /// Distance in meters under which a track point counts as reached.
    pub track_point_threshold_m: f64,
    /// On the first fix, a nearest point within this many trailing points
    /// is treated as suspicious.
    pub tail_window: usize,
    /// On the first fix, preferred replacement candidates have an index
    /// below this.
    pub head_window: usize,
    /// How many indices behind the prior a candidate may be and still count
    /// as continuous.
    pub behind_tolerance: usize,
    /// How many indices ahead of the prior a candidate may be and still
    /// count as continuous.
    pub ahead_tolerance: usize,
    /// Candidates whose index spread is below this are considered one cluster.
    pub cluster_spread: usize,
    /// Fixes with a coarser (or unknown) accuracy radius are dropped by the
    /// JNI adapter before they reach the tracker.
    pub max_fix_accuracy_m: f32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            track_point_threshold_m: 20.0,
            tail_window: 7,
            head_window: 5,
            behind_tolerance: 1,
            ahead_tolerance: 3,
            cluster_spread: 5,
            max_fix_accuracy_m: 50.0,
        }
    }
}

impl NavConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.track_point_threshold_m.is_finite() && self.track_point_threshold_m >= 0.0) {
            return Err(Error::Config(format!(
                "trackPointThresholdM must be a non-negative number, got {}",
                self.track_point_threshold_m
            )));
        }
        if self.max_fix_accuracy_m.is_nan() || self.max_fix_accuracy_m <= 0.0 {
            return Err(Error::Config(format!(
                "maxFixAccuracyM must be positive, got {}",
                self.max_fix_accuracy_m
            )));
        }
        Ok(())
    }
}

/// Radar projection and clustering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RadarConfig {
    /// Radius of the radar disc in pixels.
    pub radius_px: f32,
    /// Real-world distance drawn at the rim.
    pub max_distance_m: f64,
    /// Markers closer than this on screen merge into a cluster.
    pub cluster_threshold_px: f32,
    /// Distance of fanned-out cluster members from the centroid.
    pub fan_radius_px: f32,
    /// The viewer's own user id, excluded from projection.
    pub self_id: Option<String>,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            radius_px: 150.0,
            max_distance_m: 1_000.0,
            cluster_threshold_px: 24.0,
            fan_radius_px: 16.0,
            self_id: None,
        }
    }
}

impl RadarConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_distance_m.is_nan() || self.max_distance_m <= 0.0 {
            return Err(Error::Config(format!(
                "maxDistanceM must be positive, got {}",
                self.max_distance_m
            )));
        }
        if self.radius_px.is_nan() || self.radius_px <= 0.0 {
            return Err(Error::Config(format!("radiusPx must be positive, got {}", self.radius_px)));
        }
        Ok(())
    }
}

/// Fall-detection pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FallConfig {
    /// Rows per classifier window.
    pub window_size: usize,
    /// Rows between consecutive classifier runs once the window is full.
    pub stride: usize,
    /// Largest accelerometer/gyroscope timestamp gap that still pairs.
    pub max_pair_gap_ms: u64,
    /// Gyroscope samples kept for pairing.
    pub gyro_buffer: usize,
    /// Kalman process noise.
    pub process_noise: f32,
    /// Kalman measurement noise.
    pub measurement_noise: f32,
    /// Fall probability at or above which a fall is reported.
    pub fall_probability_threshold: f32,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            stride: 10,
            max_pair_gap_ms: 20,
            gyro_buffer: 64,
            process_noise: 0.01,
            measurement_noise: 0.1,
            fall_probability_threshold: 0.8,
        }
    }
}

impl FallConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.stride == 0 {
            return Err(Error::Config("windowSize and stride must be at least 1".into()));
        }
        if self.gyro_buffer == 0 {
            return Err(Error::Config("gyroBuffer must be at least 1".into()));
        }
        Ok(())
    }
}

/// Parse a config from JSON; an empty or blank string yields the defaults.
pub fn from_json<T>(json: &str) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if json.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(json)?)
}

impl NavConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = from_json(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl RadarConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = from_json(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl FallConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = from_json(json)?;
        config.validate()?;
        Ok(config)
    }
}
