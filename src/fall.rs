//! Fall-detection pipeline.
//!
//! Smooths accelerometer and gyroscope streams with per-axis Kalman
//! filters, pairs every accelerometer sample with the gyroscope sample
//! nearest in time, and feeds a sliding window of paired rows to a
//! classifier. The classifier itself (a trained model) lives outside this
//! crate behind [`FallClassifier`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::FallConfig;
use crate::error::{Error, Result};

/// Number of features per window row: accelerometer xyz then gyroscope xyz.
pub const ROW_FEATURES: usize = 6;

/// One window row.
pub type FeatureRow = [f32; ROW_FEATURES];

/// A three-axis inertial sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImuSample {
    pub timestamp_ms: i64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Scalar Kalman filter with a random-walk model.
#[derive(Debug, Clone)]
pub struct Kalman1D {
    process_noise: f32,
    measurement_noise: f32,
    estimate: Option<f32>,
    error: f32,
}

impl Kalman1D {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            process_noise,
            measurement_noise,
            estimate: None,
            error: 1.0,
        }
    }

    /// Fold in a measurement and return the new estimate.
    pub fn update(&mut self, measurement: f32) -> f32 {
        let Some(estimate) = self.estimate else {
            self.estimate = Some(measurement);
            self.error = self.measurement_noise;
            return measurement;
        };

        let predicted_error = self.error + self.process_noise;
        let gain = predicted_error / (predicted_error + self.measurement_noise);
        let next = estimate + gain * (measurement - estimate);

        self.error = (1.0 - gain) * predicted_error;
        self.estimate = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.estimate = None;
        self.error = 1.0;
    }
}

#[derive(Debug, Clone)]
struct AxisFilter([Kalman1D; 3]);

impl AxisFilter {
    fn new(config: &FallConfig) -> Self {
        let axis = Kalman1D::new(config.process_noise, config.measurement_noise);
        Self([axis.clone(), axis.clone(), axis])
    }

    fn smooth(&mut self, sample: &ImuSample) -> ImuSample {
        let [fx, fy, fz] = &mut self.0;
        ImuSample {
            timestamp_ms: sample.timestamp_ms,
            x: fx.update(sample.x),
            y: fy.update(sample.y),
            z: fz.update(sample.z),
        }
    }

    fn reset(&mut self) {
        self.0.iter_mut().for_each(Kalman1D::reset);
    }
}

/// The trained model, seen as a function from a window to class logits.
///
/// Logits are ordered `[no_fall, fall]`.
pub trait FallClassifier {
    fn logits(&self, window: &[FeatureRow]) -> Result<Vec<f32>>;
}

impl<F> FallClassifier for F
where
    F: Fn(&[FeatureRow]) -> Result<Vec<f32>>,
{
    fn logits(&self, window: &[FeatureRow]) -> Result<Vec<f32>> {
        self(window)
    }
}

/// Classifier verdict for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallAssessment {
    pub probability: f32,
    pub is_fall: bool,
    /// Timestamp of the newest row in the window.
    pub window_end_ms: i64,
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Gyroscope sample closest in time to `timestamp_ms`.
fn nearest_by_timestamp(samples: &VecDeque<ImuSample>, timestamp_ms: i64) -> Option<&ImuSample> {
    samples
        .iter()
        .min_by_key(|s| s.timestamp_ms.abs_diff(timestamp_ms))
}

/// Streaming fall detector.
///
/// Gyroscope samples only pair with accelerometer samples that arrive
/// after them, so the gyroscope stream should be pushed first when both
/// sensors deliver a batch.
pub struct FallDetector<C> {
    config: FallConfig,
    classifier: C,
    accel_filter: AxisFilter,
    gyro_filter: AxisFilter,
    gyro: VecDeque<ImuSample>,
    window: VecDeque<FeatureRow>,
    rows_since_run: Option<usize>,
}

impl<C: FallClassifier> FallDetector<C> {
    pub fn new(config: FallConfig, classifier: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            accel_filter: AxisFilter::new(&config),
            gyro_filter: AxisFilter::new(&config),
            gyro: VecDeque::with_capacity(config.gyro_buffer),
            window: VecDeque::with_capacity(config.window_size),
            rows_since_run: None,
            config,
            classifier,
        })
    }

    pub fn push_gyro(&mut self, sample: &ImuSample) {
        let smoothed = self.gyro_filter.smooth(sample);
        self.gyro.push_back(smoothed);
        while self.gyro.len() > self.config.gyro_buffer {
            self.gyro.pop_front();
        }
    }

    /// Add an accelerometer sample; runs the classifier when a window is due.
    pub fn push_accel(&mut self, sample: &ImuSample) -> Result<Option<FallAssessment>> {
        let accel = self.accel_filter.smooth(sample);

        let Some(gyro) = nearest_by_timestamp(&self.gyro, accel.timestamp_ms) else {
            log::trace!("no gyroscope sample yet, dropping accel at {}", accel.timestamp_ms);
            return Ok(None);
        };
        if gyro.timestamp_ms.abs_diff(accel.timestamp_ms) > self.config.max_pair_gap_ms {
            log::trace!(
                "gyroscope gap too large at {} ms, dropping sample",
                accel.timestamp_ms
            );
            return Ok(None);
        }

        self.window
            .push_back([accel.x, accel.y, accel.z, gyro.x, gyro.y, gyro.z]);
        while self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
        if let Some(rows) = self.rows_since_run.as_mut() {
            *rows += 1;
        }

        if self.window.len() < self.config.window_size {
            return Ok(None);
        }
        if matches!(self.rows_since_run, Some(rows) if rows < self.config.stride) {
            return Ok(None);
        }

        self.rows_since_run = Some(0);
        self.classify(accel.timestamp_ms).map(Some)
    }

    fn classify(&self, window_end_ms: i64) -> Result<FallAssessment> {
        let rows: Vec<FeatureRow> = self.window.iter().copied().collect();
        let logits = self.classifier.logits(&rows)?;
        if logits.len() < 2 {
            return Err(Error::Classifier(format!(
                "expected 2 logits, got {}",
                logits.len()
            )));
        }

        let probability = softmax(&logits)[1];
        let is_fall = probability >= self.config.fall_probability_threshold;
        if is_fall {
            log::warn!("fall detected at {window_end_ms} ms (p = {probability:.2})");
        } else {
            log::trace!("window at {window_end_ms} ms: p(fall) = {probability:.2}");
        }

        Ok(FallAssessment {
            probability,
            is_fall,
            window_end_ms,
        })
    }

    /// Drop buffered samples and filter state.
    pub fn reset(&mut self) {
        self.accel_filter.reset();
        self.gyro_filter.reset();
        self.gyro.clear();
        self.window.clear();
        self.rows_since_run = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp_ms: i64, v: f32) -> ImuSample {
        ImuSample { timestamp_ms, x: v, y: v, z: v }
    }

    fn small_config() -> FallConfig {
        FallConfig {
            window_size: 5,
            stride: 2,
            ..FallConfig::default()
        }
    }

    /// Says "fall" when the mean accelerometer magnitude is large.
    fn threshold_model(window: &[FeatureRow]) -> Result<Vec<f32>> {
        let mean = window.iter().map(|r| r[0].abs()).sum::<f32>() / window.len() as f32;
        Ok(if mean > 15.0 { vec![0.0, 5.0] } else { vec![5.0, 0.0] })
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);

        // Large logits must not overflow
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn kalman_converges_and_smooths() {
        let mut filter = Kalman1D::new(0.01, 0.1);
        assert_eq!(filter.update(10.0), 10.0);

        let after_spike = filter.update(20.0);
        assert!(after_spike > 10.0 && after_spike < 20.0);

        let mut last = after_spike;
        for _ in 0..200 {
            last = filter.update(20.0);
        }
        assert!((last - 20.0).abs() < 0.01);
    }

    #[test]
    fn windows_fire_on_fill_then_every_stride() {
        let mut detector = FallDetector::new(small_config(), threshold_model).unwrap();

        let mut fired = Vec::new();
        for i in 0..9 {
            let t = i * 10;
            detector.push_gyro(&sample(t, 0.1));
            if detector.push_accel(&sample(t + 2, 9.8)).unwrap().is_some() {
                fired.push(i);
            }
        }
        assert_eq!(fired, vec![4, 6, 8]);
    }

    #[test]
    fn unpaired_samples_are_dropped() {
        let mut detector = FallDetector::new(small_config(), threshold_model).unwrap();

        // No gyroscope data at all
        assert_eq!(detector.push_accel(&sample(0, 9.8)).unwrap(), None);

        // Gyroscope too far in the past
        detector.push_gyro(&sample(0, 0.0));
        for i in 1..10 {
            assert_eq!(detector.push_accel(&sample(i * 100, 9.8)).unwrap(), None);
        }
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let mut detector = FallDetector::new(small_config(), threshold_model).unwrap();

        detector.push_gyro(&sample(i64::MIN, 0.0));
        assert_eq!(detector.push_accel(&sample(i64::MAX, 9.8)).unwrap(), None);

        // A close gyroscope sample still pairs after the extreme one
        detector.push_gyro(&sample(i64::MAX - 5, 0.0));
        assert!(detector.push_accel(&sample(i64::MAX, 9.8)).is_ok());
        assert_eq!(detector.window.len(), 1);
    }

    #[test]
    fn detects_fall_in_window() {
        let mut detector = FallDetector::new(small_config(), threshold_model).unwrap();

        let mut verdicts = Vec::new();
        for i in 0..12 {
            let t = i * 10;
            let accel = if i >= 5 { 30.0 } else { 9.8 };
            detector.push_gyro(&sample(t, 2.0));
            if let Some(verdict) = detector.push_accel(&sample(t, accel)).unwrap() {
                verdicts.push(verdict);
            }
        }

        assert!(!verdicts[0].is_fall);
        let last = verdicts.last().unwrap();
        assert!(last.is_fall);
        assert!(last.probability > 0.99);
        // Windows close at i = 4, 6, 8, 10
        assert_eq!(verdicts.len(), 4);
        assert_eq!(last.window_end_ms, 100);
    }

    #[test]
    fn classifier_output_is_checked() {
        let broken = |_: &[FeatureRow]| -> Result<Vec<f32>> { Ok(vec![1.0]) };
        let mut detector = FallDetector::new(small_config(), broken).unwrap();

        let mut result = Ok(None);
        for i in 0..5 {
            detector.push_gyro(&sample(i, 0.0));
            result = detector.push_accel(&sample(i, 0.0));
        }
        assert!(matches!(result, Err(Error::Classifier(_))));
    }

    #[test]
    fn reset_empties_the_window() {
        let mut detector = FallDetector::new(small_config(), threshold_model).unwrap();
        for i in 0..5 {
            detector.push_gyro(&sample(i, 0.0));
            detector.push_accel(&sample(i, 0.0)).unwrap();
        }
        detector.reset();

        detector.push_gyro(&sample(10, 0.0));
        assert_eq!(detector.push_accel(&sample(10, 0.0)).unwrap(), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = FallConfig { window_size: 0, ..FallConfig::default() };
        assert!(FallDetector::new(config, threshold_model).is_err());
    }
}
