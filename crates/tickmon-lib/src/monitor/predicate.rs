//! Report predicates
//!
//! Decide whether a measured tick is worth reporting, given its duration
//! and its deviation from the calibrated baseline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::format_decimal;

/// Invalid predicate configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("threshold must be a finite number, got {0}")]
    NonFiniteThreshold(f64),
}

/// Policy deciding which ticks are reported
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReportPredicate {
    /// Report ticks whose percentage increase over the baseline exceeds
    /// `threshold`
    PercentageChange { threshold: f64 },
    /// Report ticks whose duration in milliseconds exceeds `threshold`
    Duration { threshold: f64 },
}

impl ReportPredicate {
    /// Relative threshold, in percent above the baseline
    pub fn relative(threshold: f64) -> Result<Self, PredicateError> {
        validate(threshold)?;
        Ok(ReportPredicate::PercentageChange { threshold })
    }

    /// Absolute threshold, in milliseconds
    pub fn absolute(threshold: f64) -> Result<Self, PredicateError> {
        validate(threshold)?;
        Ok(ReportPredicate::Duration { threshold })
    }

    pub fn threshold(&self) -> f64 {
        match self {
            ReportPredicate::PercentageChange { threshold }
            | ReportPredicate::Duration { threshold } => *threshold,
        }
    }

    /// Whether a tick should be reported
    ///
    /// A tick that is not slower than the baseline is never reported,
    /// whatever the threshold.
    pub fn should_report(
        &self,
        duration: f64,
        increase_from_baseline: f64,
        percentage_change: f64,
    ) -> bool {
        // Also rejects NaN
        if !(increase_from_baseline > 0.0) {
            return false;
        }

        match self {
            ReportPredicate::PercentageChange { threshold } => percentage_change > *threshold,
            ReportPredicate::Duration { threshold } => duration > *threshold,
        }
    }

    /// Human-readable statement of the policy, shown when monitoring begins
    pub fn describe_start(&self) -> String {
        match self {
            ReportPredicate::PercentageChange { threshold } => format!(
                "Starting now, any ticks with >{}% increase in duration compared to the average will be reported.",
                format_decimal(*threshold)
            ),
            ReportPredicate::Duration { threshold } => format!(
                "Starting now, any ticks with duration >{} will be reported.",
                format_decimal(*threshold)
            ),
        }
    }
}

impl std::fmt::Display for ReportPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportPredicate::PercentageChange { threshold } => {
                write!(f, "percentage_change>{}%", format_decimal(*threshold))
            }
            ReportPredicate::Duration { threshold } => {
                write!(f, "duration>{}ms", format_decimal(*threshold))
            }
        }
    }
}

fn validate(threshold: f64) -> Result<(), PredicateError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(PredicateError::NonFiniteThreshold(threshold))
    }
}
