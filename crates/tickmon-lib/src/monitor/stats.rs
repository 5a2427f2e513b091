//! Streaming statistics for baseline calibration
//!
//! Accumulates count, min, max and sum one sample at a time with constant
//! memory. Unlike a rolling window nothing ever expires: the accumulator is
//! only fed during calibration and then frozen.

use serde::{Deserialize, Serialize};

/// Running summary statistics over tick durations
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl CalibrationStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Add a sample
    pub fn accept(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Arithmetic mean of all samples
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Copyable snapshot, `None` while empty
    pub fn summary(&self) -> Option<CalibrationSummary> {
        Some(CalibrationSummary {
            count: self.count,
            min: self.min()?,
            max: self.max()?,
            average: self.average()?,
        })
    }
}

impl Default for CalibrationStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen result of calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats() {
        let stats = CalibrationStats::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
        assert_eq!(stats.average(), None);
        assert!(stats.summary().is_none());
    }

    #[test]
    fn test_stats_calculation() {
        let mut stats = CalibrationStats::new();
        for i in 1..=20 {
            stats.accept(i as f64);
        }

        assert_eq!(stats.count(), 20);
        assert_eq!(stats.min(), Some(1.0));
        assert_eq!(stats.max(), Some(20.0));
        assert!((stats.average().unwrap() - 10.5).abs() < 1e-9);

        let summary = stats.summary().unwrap();
        assert_eq!(summary.count, 20);
        assert!((summary.average - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample() {
        let mut stats = CalibrationStats::new();
        stats.accept(42.5);

        let summary = stats.summary().unwrap();
        assert_eq!(summary.min, 42.5);
        assert_eq!(summary.max, 42.5);
        assert_eq!(summary.average, 42.5);
    }

    #[test]
    fn test_negative_samples_are_accumulated() {
        let mut stats = CalibrationStats::new();
        stats.accept(-3.0);
        stats.accept(5.0);

        assert_eq!(stats.min(), Some(-3.0));
        assert_eq!(stats.max(), Some(5.0));
        assert_eq!(stats.average(), Some(1.0));
    }
}
