//! Temperature readings produced by the sampling loop

use crate::sensor::SensorId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a read attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFaultKind {
    /// The read did not complete within its deadline
    Timeout,
    /// The device or bus reported an error
    IoError,
    /// The device answered with an implausible value
    OutOfRange,
}

impl fmt::Display for SensorFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorFaultKind::Timeout => "timeout",
            SensorFaultKind::IoError => "I/O error",
            SensorFaultKind::OutOfRange => "out of range",
        };
        f.write_str(name)
    }
}

/// Measured value, or a marker recording that acquisition failed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingValue {
    Celsius(f64),
    /// FaultMarker: all read attempts for the tick failed
    Fault(SensorFaultKind),
}

impl ReadingValue {
    pub fn celsius(&self) -> Option<f64> {
        match self {
            ReadingValue::Celsius(value) => Some(*value),
            ReadingValue::Fault(_) => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, ReadingValue::Fault(_))
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Celsius(value) => write!(f, "{}", value),
            ReadingValue::Fault(_) => f.write_str("ERROR"),
        }
    }
}

/// Which cadence produced a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickKind {
    /// Log cadence: recorded in the session buffer and persisted
    Log,
    /// View cadence: shown on the display only
    View,
}

impl TickKind {
    /// Row tag used in log lines and exports (`LOG` / `VIEW`)
    pub fn tag(&self) -> &'static str {
        match self {
            TickKind::Log => "LOG",
            TickKind::View => "VIEW",
        }
    }
}

/// One sensor's result for one tick. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: SensorId,
    /// Tick number within the session for this reading's cadence (1-based)
    pub tick: u64,
    /// Offset from session start on the monotonic clock
    pub monotonic: Duration,
    /// Wall-clock time, for display and export only
    pub timestamp: DateTime<Local>,
    pub value: ReadingValue,
}

impl Reading {
    pub fn new(
        sensor_id: SensorId,
        tick: u64,
        monotonic: Duration,
        timestamp: DateTime<Local>,
        value: ReadingValue,
    ) -> Self {
        Self {
            sensor_id,
            tick,
            monotonic,
            timestamp,
            value,
        }
    }

    pub fn celsius(&self) -> Option<f64> {
        self.value.celsius()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_renders_as_error() {
        assert_eq!(ReadingValue::Fault(SensorFaultKind::Timeout).to_string(), "ERROR");
        assert_eq!(ReadingValue::Celsius(21.5).to_string(), "21.5");
    }

    #[test]
    fn test_reading_value_serialization() {
        let json = serde_json::to_string(&ReadingValue::Fault(SensorFaultKind::IoError)).unwrap();
        assert_eq!(json, "{\"fault\":\"io_error\"}");

        let back: ReadingValue = serde_json::from_str("{\"celsius\":20.0}").unwrap();
        assert_eq!(back.celsius(), Some(20.0));
    }
}
