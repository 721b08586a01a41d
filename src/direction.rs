//! Compass arrow smoothing.
//!
//! Raw compass readings jitter by a few degrees even when the watch is
//! held still. The arrow only moves when the new bearing differs from the
//! last rendered one by at least a threshold.

use crate::geo::{angular_difference, normalize_degrees};

/// Minimum bearing change, in degrees, that moves the arrow.
pub const DEFAULT_DIRECTION_THRESHOLD_DEG: f64 = 10.0;

/// Whether `new` differs enough from the last rendered bearing `old`.
///
/// Always true when nothing has been rendered yet. The difference is taken
/// along the shorter arc, so 359° and 1° are 2° apart.
pub fn should_update_direction(new: f64, old: Option<f64>, threshold_deg: f64) -> bool {
    match old {
        None => true,
        Some(old) => angular_difference(new, old) >= threshold_deg,
    }
}

/// Arrow rotation on the watch face for a target bearing and device heading.
pub fn relative_arrow_angle(bearing_to_target: f64, heading: f64) -> f64 {
    normalize_degrees(bearing_to_target - heading)
}

/// Holds the last rendered arrow bearing on behalf of the UI.
#[derive(Debug, Clone)]
pub struct ArrowSmoother {
    threshold_deg: f64,
    rendered: Option<f64>,
}

impl ArrowSmoother {
    pub fn new(threshold_deg: f64) -> Self {
        Self {
            threshold_deg,
            rendered: None,
        }
    }

    /// Offer a new bearing; returns it if the arrow should move to it.
    pub fn offer(&mut self, bearing: f64) -> Option<f64> {
        if should_update_direction(bearing, self.rendered, self.threshold_deg) {
            self.rendered = Some(bearing);
            Some(bearing)
        } else {
            None
        }
    }

    pub fn rendered(&self) -> Option<f64> {
        self.rendered
    }

    pub fn reset(&mut self) {
        self.rendered = None;
    }
}

impl Default for ArrowSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTION_THRESHOLD_DEG)
    }
}
