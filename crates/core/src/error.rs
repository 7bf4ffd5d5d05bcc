//! Error types for the acquisition engine
//!
//! Sensor faults are recovered locally by the scheduler and only surface as
//! diagnostics. Start rejections are returned to whoever issued the Start.
//! A session integrity error is the one failure that halts sampling.

use std::io;
use std::time::Duration;
use templog_types::{SensorFaultKind, SensorId, ThresholdError};

/// A single failed read attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct SensorFault {
    pub kind: SensorFaultKind,
    pub detail: String,
}

impl SensorFault {
    pub fn new(kind: SensorFaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(SensorFaultKind::Timeout, format!("no answer within {:?}", after))
    }

    pub fn io(detail: impl Into<String>) -> Self {
        Self::new(SensorFaultKind::IoError, detail)
    }

    pub fn out_of_range(celsius: f64) -> Self {
        Self::new(
            SensorFaultKind::OutOfRange,
            format!("implausible value {}°C", celsius),
        )
    }
}

impl From<io::Error> for SensorFault {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            Self::new(SensorFaultKind::Timeout, err.to_string())
        } else {
            Self::io(err.to_string())
        }
    }
}

/// Why a Start command was refused. The session stays as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StartRejected {
    #[error("no active sensors selected")]
    NoActiveSensors,
    #[error("unknown sensor {0}")]
    UnknownSensor(SensorId),
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("start condition not met by any active sensor")]
    StartConditionNotMet,
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(#[from] ThresholdError),
    #[error("previous session has {readings} unexported readings")]
    UnexportedData { readings: usize },
    #[error("engine halted after an integrity fault")]
    EngineHalted,
}

/// The session buffer was asked to accept data that would corrupt it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionIntegrityError {
    #[error("reading for {sensor} at tick {tick} arrived after tick {last_tick}")]
    OutOfOrder {
        sensor: SensorId,
        tick: u64,
        last_tick: u64,
    },
    #[error("append to a sealed session buffer")]
    Sealed,
    #[error("append with no open session")]
    NoSession,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("start rejected: {0}")]
    StartRejected(#[from] StartRejected),
    #[error("no session is running")]
    NotRunning,
    #[error("engine task is not running")]
    Closed,
    #[error("sampling halted: {0}")]
    Halted(#[from] SessionIntegrityError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let fault: SensorFault = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(fault.kind, SensorFaultKind::IoError);

        let fault: SensorFault = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(fault.kind, SensorFaultKind::Timeout);
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            EngineError::from(StartRejected::NoActiveSensors).to_string(),
            "start rejected: no active sensors selected"
        );
    }
}
