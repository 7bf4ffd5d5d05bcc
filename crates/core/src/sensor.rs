//! Sensor trait and related types

use crate::error::SensorFault;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use templog_types::SensorId;

/// Measurement range of a DS18B20 in °C
pub const DS18B20_RANGE: RangeInclusive<f64> = -55.0..=125.0;

/// Metadata about a sensor
#[derive(Debug, Clone)]
pub struct SensorMetadata {
    /// Bus address, stable for the lifetime of the process
    pub id: SensorId,
    /// Which backend provides the sensor (e.g. "w1", "system", "simulated")
    pub source: String,
    /// Human-readable description, shown when listing sensors
    pub description: String,
    /// Plausible values; anything outside is reported as out of range
    pub valid_range: RangeInclusive<f64>,
    /// Shortest time a healthy read can take; read deadlines never go below it
    pub min_read_time: Duration,
}

impl SensorMetadata {
    pub fn new(id: impl Into<SensorId>, source: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            description: description.into(),
            valid_range: DS18B20_RANGE,
            min_read_time: Duration::ZERO,
        }
    }

    pub fn with_range(mut self, range: RangeInclusive<f64>) -> Self {
        self.valid_range = range;
        self
    }

    pub fn with_min_read_time(mut self, min_read_time: Duration) -> Self {
        self.min_read_time = min_read_time;
        self
    }
}

/// Trait for all temperature sensors
///
/// `read` performs blocking hardware I/O. Callers run it off the async
/// executor and enforce their own deadline; implementations must not
/// assume they will be waited on forever, and must report failures as
/// `SensorFault` rather than panicking.
pub trait SensorHandle: Send + Sync {
    /// Get metadata about this sensor
    fn metadata(&self) -> &SensorMetadata;

    /// Read the current temperature in °C
    fn read(&self) -> Result<f64, SensorFault>;

    fn id(&self) -> &SensorId {
        &self.metadata().id
    }

    /// Check whether a value is plausible for this sensor
    fn validate(&self, celsius: f64) -> Result<f64, SensorFault> {
        if celsius.is_finite() && self.metadata().valid_range.contains(&celsius) {
            Ok(celsius)
        } else {
            Err(SensorFault::out_of_range(celsius))
        }
    }
}

/// Shared, thread-safe sensor handle
pub type SharedSensor = Arc<dyn SensorHandle>;

#[cfg(test)]
mod tests {
    use super::*;
    use templog_types::SensorFaultKind;

    struct Fixed(SensorMetadata, f64);

    impl SensorHandle for Fixed {
        fn metadata(&self) -> &SensorMetadata {
            &self.0
        }

        fn read(&self) -> Result<f64, SensorFault> {
            Ok(self.1)
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_and_nan() {
        let sensor = Fixed(SensorMetadata::new("28-a", "test", "fixed"), 20.0);
        assert_eq!(sensor.validate(20.0).ok(), Some(20.0));
        assert_eq!(
            sensor.validate(200.0).map_err(|e| e.kind),
            Err(SensorFaultKind::OutOfRange)
        );
        assert_eq!(
            sensor.validate(f64::NAN).map_err(|e| e.kind),
            Err(SensorFaultKind::OutOfRange)
        );
    }
}
