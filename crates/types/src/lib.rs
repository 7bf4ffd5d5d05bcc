//! templog-types: Shared data types for the templog temperature logger.
//!
//! This crate contains pure data types (sensor identities, readings,
//! thresholds, sessions, events and commands) shared by the engine, the
//! sensor sources and the application layer. Nothing in here performs I/O.

pub mod commands;
pub mod events;
pub mod reading;
pub mod sampling;
pub mod sensor;
pub mod session;
pub mod threshold;

// Re-export commonly used types at the crate root for convenience
pub use commands::{ConfigUpdate, StartCommand, StopCommand};
pub use events::{DiagnosticEvent, DiagnosticKind, EngineEvent, SessionStateEvent, TickEvent};
pub use reading::{Reading, ReadingValue, SensorFaultKind, TickKind};
pub use sampling::{RetentionPolicy, RetryPolicy, SamplingConfig, UnexportedDataPolicy};
pub use sensor::{SensorId, SensorIdentity, SensorStatus};
pub use session::{
    Session, SessionId, SessionProgress, SessionStatus, SessionSummary, SensorStats, StopReason,
};
pub use threshold::{Bound, ThresholdConfig, ThresholdError};
