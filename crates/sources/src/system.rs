//! Thermal sensors exposed by the host (CPU package, chipset, drives)
//!
//! Useful on machines without a 1-Wire bus and as a sanity check of the
//! pipeline. Values come from sysinfo through the shared components cache.

use crate::shared_components;
use templog_core::{SensorFault, SensorHandle, SensorMetadata};

/// Prefix of system sensor ids, keeping them apart from bus addresses
pub const SYSTEM_ID_PREFIX: &str = "sys:";

pub struct SystemSensor {
    metadata: SensorMetadata,
    label: String,
}

impl SystemSensor {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let id = format!("{}{}", SYSTEM_ID_PREFIX, label.replace(char::is_whitespace, "_"));
        let description = format!("Host thermal sensor '{}'", label);
        Self {
            metadata: SensorMetadata::new(id, "system", description).with_range(-40.0..=150.0),
            label,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl SensorHandle for SystemSensor {
    fn metadata(&self) -> &SensorMetadata {
        &self.metadata
    }

    fn read(&self) -> Result<f64, SensorFault> {
        shared_components::temperature_by_label(&self.label)
            .map(f64::from)
            .ok_or_else(|| SensorFault::io(format!("component '{}' no longer present", self.label)))
    }
}

/// One sensor per host thermal component
pub fn discover() -> Vec<SystemSensor> {
    let mut seen = std::collections::BTreeSet::new();
    shared_components::labels()
        .into_iter()
        .filter(|label| seen.insert(label.clone()))
        .map(SystemSensor::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_prefixed_and_whitespace_free() {
        let sensor = SystemSensor::new("coretemp Package id 0");
        assert_eq!(sensor.id().as_str(), "sys:coretemp_Package_id_0");
        assert_eq!(sensor.label(), "coretemp Package id 0");
        assert_eq!(sensor.metadata().source, "system");
    }

    #[test]
    fn test_missing_component_is_io_fault() {
        let sensor = SystemSensor::new("definitely not a real component");
        assert!(sensor.read().is_err());
    }
}
