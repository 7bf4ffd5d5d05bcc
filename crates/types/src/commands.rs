//! Commands accepted by the engine from the presentation layer

use crate::sensor::SensorId;
use crate::session::StopReason;
use crate::threshold::ThresholdConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Request to open a new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCommand {
    /// Measurement name
    pub name: String,
    pub thresholds: ThresholdConfig,
    pub duration_limit: Option<Duration>,
    pub active_sensors: BTreeSet<SensorId>,
}

impl StartCommand {
    pub fn new(name: impl Into<String>, active_sensors: impl IntoIterator<Item = SensorId>) -> Self {
        Self {
            name: name.into(),
            thresholds: ThresholdConfig::none(),
            duration_limit: None,
            active_sensors: active_sensors.into_iter().collect(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_duration(mut self, limit: Duration) -> Self {
        self.duration_limit = Some(limit);
        self
    }
}

/// Request to end the running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopCommand {
    pub reason: StopReason,
}

impl StopCommand {
    pub fn manual() -> Self {
        Self {
            reason: StopReason::Manual,
        }
    }
}

/// Configuration change, applied at the next tick boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub log_interval_ms: Option<u64>,
    /// `Some(None)` turns the separate view cadence off
    #[serde(default)]
    pub display_interval_ms: Option<Option<u64>>,
    #[serde(default)]
    pub labels: BTreeMap<SensorId, String>,
    /// Sensors to add to the active set
    #[serde(default)]
    pub enable: Vec<SensorId>,
    /// Sensors to remove from the active set
    #[serde(default)]
    pub disable: Vec<SensorId>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.log_interval_ms.is_none()
            && self.display_interval_ms.is_none()
            && self.labels.is_empty()
            && self.enable.is_empty()
            && self.disable.is_empty()
    }

    pub fn rename(sensor: SensorId, label: impl Into<String>) -> Self {
        let mut update = Self::default();
        update.labels.insert(sensor, label.into());
        update
    }

    /// Fold a later update into this one; later values win
    pub fn merge(&mut self, later: ConfigUpdate) {
        if later.log_interval_ms.is_some() {
            self.log_interval_ms = later.log_interval_ms;
        }
        if later.display_interval_ms.is_some() {
            self.display_interval_ms = later.display_interval_ms;
        }
        self.labels.extend(later.labels);
        for sensor in later.enable {
            self.disable.retain(|s| s != &sensor);
            if !self.enable.contains(&sensor) {
                self.enable.push(sensor);
            }
        }
        for sensor in later.disable {
            self.enable.retain(|s| s != &sensor);
            if !self.disable.contains(&sensor) {
                self.disable.push(sensor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_later_wins() {
        let a = SensorId::new("28-a");
        let mut first = ConfigUpdate {
            log_interval_ms: Some(1000),
            enable: vec![a.clone()],
            ..ConfigUpdate::default()
        };
        let second = ConfigUpdate {
            log_interval_ms: Some(5000),
            disable: vec![a.clone()],
            ..ConfigUpdate::default()
        };

        first.merge(second);
        assert_eq!(first.log_interval_ms, Some(5000));
        assert!(first.enable.is_empty());
        assert_eq!(first.disable, vec![a]);
    }

    #[test]
    fn test_empty_update() {
        assert!(ConfigUpdate::default().is_empty());
        assert!(!ConfigUpdate::rename(SensorId::new("28-a"), "Inlet").is_empty());
    }
}
