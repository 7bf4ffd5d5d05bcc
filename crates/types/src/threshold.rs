//! Start/stop threshold configuration

use crate::sensor::SensorId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A one-sided temperature condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Satisfied when a reading is at or above the value
    Above(f64),
    /// Satisfied when a reading is at or below the value
    Below(f64),
}

impl Bound {
    pub fn value(&self) -> f64 {
        match self {
            Bound::Above(value) | Bound::Below(value) => *value,
        }
    }

    pub fn is_satisfied(&self, celsius: f64) -> bool {
        match self {
            Bound::Above(limit) => celsius >= *limit,
            Bound::Below(limit) => celsius <= *limit,
        }
    }

    /// Whether `celsius` lies at least `hysteresis` degrees on the safe side of the bound
    pub fn is_cleared(&self, celsius: f64, hysteresis: f64) -> bool {
        match self {
            Bound::Above(limit) => celsius <= *limit - hysteresis,
            Bound::Below(limit) => celsius >= *limit + hysteresis,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Above(limit) => write!(f, ">= {:.2}°C", limit),
            Bound::Below(limit) => write!(f, "<= {:.2}°C", limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("threshold value {0} is not a finite number")]
    NonFinite(f64),
    #[error("hysteresis must be a finite, non-negative number (got {0})")]
    InvalidHysteresis(f64),
    #[error("stop threshold {stop} must lie beyond start threshold {start}")]
    StopNotBeyondStart { start: Bound, stop: Bound },
}

fn default_hysteresis() -> f64 {
    0.5
}

/// Threshold configuration for a session. Read-only while the session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Gate for accepting Start (at least one active sensor must satisfy it)
    #[serde(default)]
    pub start: Option<Bound>,
    /// Condition that ends a running session
    #[serde(default)]
    pub stop: Option<Bound>,
    /// Margin a value must clear before a triggered stop condition re-arms
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    /// Sensors the conditions apply to; `None` means every active sensor
    #[serde(default)]
    pub tracked: Option<BTreeSet<SensorId>>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            hysteresis: default_hysteresis(),
            tracked: None,
        }
    }
}

impl ThresholdConfig {
    /// No start gate and no stop condition
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, bound: Bound) -> Self {
        self.start = Some(bound);
        self
    }

    pub fn with_stop(mut self, bound: Bound) -> Self {
        self.stop = Some(bound);
        self
    }

    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    pub fn is_tracked(&self, sensor: &SensorId) -> bool {
        self.tracked
            .as_ref()
            .map(|tracked| tracked.contains(sensor))
            .unwrap_or(true)
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        for bound in self.start.iter().chain(self.stop.iter()) {
            if !bound.value().is_finite() {
                return Err(ThresholdError::NonFinite(bound.value()));
            }
        }
        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            return Err(ThresholdError::InvalidHysteresis(self.hysteresis));
        }

        // A stop bound on the near side of its start bound would end the
        // session on the very reading that allowed it to start.
        match (self.start, self.stop) {
            (Some(Bound::Above(start)), Some(Bound::Above(stop))) if stop <= start => {
                Err(ThresholdError::StopNotBeyondStart {
                    start: Bound::Above(start),
                    stop: Bound::Above(stop),
                })
            }
            (Some(Bound::Below(start)), Some(Bound::Below(stop))) if stop >= start => {
                Err(ThresholdError::StopNotBeyondStart {
                    start: Bound::Below(start),
                    stop: Bound::Below(stop),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_satisfied_is_inclusive() {
        assert!(Bound::Above(30.0).is_satisfied(30.0));
        assert!(!Bound::Above(30.0).is_satisfied(29.9));
        assert!(Bound::Below(5.0).is_satisfied(5.0));
        assert!(!Bound::Below(5.0).is_satisfied(5.1));
    }

    #[test]
    fn test_bound_cleared_requires_hysteresis_margin() {
        let below = Bound::Below(5.0);
        assert!(!below.is_cleared(5.9, 1.0));
        assert!(below.is_cleared(6.0, 1.0));

        let above = Bound::Above(30.0);
        assert!(!above.is_cleared(29.5, 1.0));
        assert!(above.is_cleared(29.0, 1.0));
    }

    #[test]
    fn test_stop_must_exceed_start() {
        let config = ThresholdConfig::none()
            .with_start(Bound::Above(30.0))
            .with_stop(Bound::Above(22.0));
        assert!(matches!(
            config.validate(),
            Err(ThresholdError::StopNotBeyondStart { .. })
        ));

        let config = ThresholdConfig::none()
            .with_start(Bound::Above(22.0))
            .with_stop(Bound::Above(30.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_hysteresis_rejected() {
        let config = ThresholdConfig::none().with_hysteresis(-0.1);
        assert_eq!(config.validate(), Err(ThresholdError::InvalidHysteresis(-0.1)));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ThresholdConfig = serde_json::from_str("{\"stop\":{\"above\":30.0}}").unwrap();
        assert_eq!(config.stop, Some(Bound::Above(30.0)));
        assert_eq!(config.start, None);
        assert!((config.hysteresis - 0.5).abs() < f64::EPSILON);
        assert!(config.is_tracked(&SensorId::new("28-any")));
    }
}
