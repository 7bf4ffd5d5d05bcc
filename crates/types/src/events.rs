//! Events emitted by the engine to display and persistence consumers

use crate::reading::{Reading, SensorFaultKind, TickKind};
use crate::sensor::SensorId;
use crate::session::{SessionId, SessionStatus, SessionSummary, StopReason};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All readings of one closed tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    pub session_id: SessionId,
    pub kind: TickKind,
    pub tick: u64,
    pub monotonic: Duration,
    pub timestamp: DateTime<Local>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Every attempt in a tick failed; a fault marker was recorded
    ReadFailed(SensorFaultKind),
    /// A sensor answered again after failed ticks
    Recovered,
    /// Terminal: the sensor is excluded from further ticks
    SensorDisabled,
    /// A sensor joined the active set mid-session
    SensorEnabled,
    /// A sensor left the active set mid-session
    SensorDeactivated,
    /// Unexported readings of a previous session were dropped
    DataDiscarded { readings: usize },
    /// A configuration update took effect
    ConfigApplied,
    /// The session buffer rejected data; sampling halted
    IntegrityFault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub sensor_id: Option<SensorId>,
    pub kind: DiagnosticKind,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl DiagnosticEvent {
    pub fn for_sensor(sensor_id: SensorId, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            sensor_id: Some(sensor_id),
            kind,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    pub fn engine(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            sensor_id: None,
            kind,
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}

/// A session state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStateEvent {
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Set when `status` is `Stopped`
    pub reason: Option<StopReason>,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Tick(TickEvent),
    Diagnostic(DiagnosticEvent),
    SessionState(SessionStateEvent),
    Summary(SessionSummary),
}
