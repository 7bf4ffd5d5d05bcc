//! Sensor identity types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bus address of a physical sensor (e.g. `28-0316a2795aff` for a DS18B20)
///
/// Immutable for the lifetime of the process; used as the key everywhere
/// a sensor is referenced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SensorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A sensor's immutable identity plus its user-editable display label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorIdentity {
    pub id: SensorId,
    pub label: String,
}

impl SensorIdentity {
    pub fn new(id: impl Into<SensorId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Default label for the sensor at `index` in discovery order (`Sensor_1`, ...)
    pub fn default_label(index: usize) -> String {
        format!("Sensor_{}", index + 1)
    }

    pub fn rename(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }
}

/// Acquisition status of a sensor within the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    /// Part of the active set and read every tick
    #[default]
    Active,
    /// Known but not part of the active set
    Inactive,
    /// Excluded after too many consecutive failed ticks
    Disabled,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Active => "Active",
            SensorStatus::Inactive => "Inactive",
            SensorStatus::Disabled => "DISABLED",
        }
    }
}
