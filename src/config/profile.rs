//! Sensor profiles - saved measurement setups
//!
//! A profile captures which sensors to log, their names, the thresholds,
//! both cadences and the duration, so a measurement can be repeated.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::AppConfig;
use templog_types::{Bound, ConfigUpdate, SensorId, StartCommand, ThresholdConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    #[serde(default)]
    pub active_sensors: Vec<SensorId>,
    #[serde(default)]
    pub sensor_names: BTreeMap<SensorId, String>,
    /// Logging starts once any sensor reaches this (°C)
    #[serde(default)]
    pub start_threshold: Option<f64>,
    /// Logging stops once any sensor reaches this (°C)
    #[serde(default)]
    pub stop_threshold: Option<f64>,
    /// Log cadence in seconds
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,
    /// View cadence in seconds
    #[serde(default = "default_view_interval")]
    pub view_interval: u64,
    /// Session length in hours; 0 runs until stopped
    #[serde(default, alias = "duration")]
    pub duration_hours: f64,
    #[serde(default = "default_measurement_name")]
    pub measurement_name: String,
}

fn default_log_interval() -> u64 {
    10
}

fn default_view_interval() -> u64 {
    3
}

fn default_measurement_name() -> String {
    "temptestlog".to_string()
}

impl SensorProfile {
    /// A profile using the application defaults over `sensors`
    pub fn from_config(config: &AppConfig, sensors: impl IntoIterator<Item = SensorId>) -> Self {
        Self {
            active_sensors: sensors.into_iter().collect(),
            sensor_names: config.sensor_labels.clone(),
            start_threshold: Some(config.default_start_threshold),
            stop_threshold: Some(config.default_stop_threshold),
            log_interval: config.default_log_interval,
            view_interval: config.default_view_interval,
            duration_hours: 0.0,
            measurement_name: default_measurement_name(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid profile {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write profile {}", path.display()))?;
        Ok(())
    }

    pub fn duration(&self) -> Result<Option<Duration>> {
        duration_from_hours(self.duration_hours)
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            start: self.start_threshold.map(Bound::Above),
            stop: self.stop_threshold.map(Bound::Above),
            ..ThresholdConfig::none()
        }
    }

    pub fn start_command(&self) -> Result<StartCommand> {
        let command = StartCommand::new(self.measurement_name.clone(), self.active_sensors.clone())
            .with_thresholds(self.thresholds());
        Ok(match self.duration()? {
            Some(limit) => command.with_duration(limit),
            None => command,
        })
    }

    /// Cadence and label changes this profile implies for the engine
    pub fn config_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            log_interval_ms: Some(self.log_interval.max(1).saturating_mul(1000)),
            display_interval_ms: Some(match self.view_interval {
                0 => None,
                secs => Some(secs.saturating_mul(1000)),
            }),
            labels: self.sensor_names.clone(),
            ..ConfigUpdate::default()
        }
    }
}

/// Session length for a duration in hours; zero means no limit
pub fn duration_from_hours(hours: f64) -> Result<Option<Duration>> {
    if !(hours.is_finite() && hours >= 0.0) {
        bail!("duration must be a non-negative number of hours, got {}", hours);
    }
    if hours == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(hours * 3600.0)
        .map(Some)
        .with_context(|| format!("duration of {} hours is too long", hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_profile_with_hour_duration_key() {
        let json = r#"{
            "active_sensors": ["28-a", "28-b"],
            "sensor_names": {"28-a": "Inlet"},
            "start_threshold": 22.0,
            "stop_threshold": 30.0,
            "log_interval": 5,
            "view_interval": 1,
            "duration": 1.5,
            "measurement_name": "oven"
        }"#;
        let profile: SensorProfile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.duration().unwrap(), Some(Duration::from_secs(5400)));
        let command = profile.start_command().unwrap();
        assert_eq!(command.name, "oven");
        assert_eq!(command.active_sensors.len(), 2);
        assert_eq!(command.thresholds.start, Some(Bound::Above(22.0)));
        assert_eq!(command.thresholds.stop, Some(Bound::Above(30.0)));

        let update = profile.config_update();
        assert_eq!(update.log_interval_ms, Some(5000));
        assert_eq!(update.display_interval_ms, Some(Some(1000)));
    }

    #[test]
    fn test_zero_duration_runs_until_stopped() {
        let profile: SensorProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile.duration().unwrap(), None);
        assert_eq!(profile.measurement_name, "temptestlog");
        assert_eq!(profile.thresholds(), ThresholdConfig::none());
    }

    #[test]
    fn test_out_of_range_durations_are_errors() {
        assert_eq!(duration_from_hours(0.5).unwrap(), Some(Duration::from_secs(1800)));
        assert!(duration_from_hours(1e300).is_err());
        assert!(duration_from_hours(f64::INFINITY).is_err());
        assert!(duration_from_hours(f64::NAN).is_err());
        assert!(duration_from_hours(-1.0).is_err());

        let profile: SensorProfile = serde_json::from_str(r#"{"duration": 1e300}"#).unwrap();
        assert!(profile.duration().is_err());
        assert!(profile.start_command().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SensorConfigs").join("oven.json");
        let profile = SensorProfile::from_config(&AppConfig::default(), [SensorId::new("28-a")]);

        profile.save(&path).unwrap();
        assert_eq!(SensorProfile::load(&path).unwrap(), profile);
    }
}
