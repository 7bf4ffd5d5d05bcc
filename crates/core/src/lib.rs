//! templog-core: Acquisition and control engine for the templog logger.
//!
//! This crate contains the sensor trait seam (`SensorHandle`), the sampling
//! scheduler with its per-tick retry policy, the threshold controller, the
//! shared session buffer and the engine task that wires them together and
//! talks to the outside world through commands and events.

mod buffer;
mod controller;
mod engine;
mod error;
mod events;
mod fault;
mod retry;
mod scheduler;
mod sensor;

pub use buffer::{SessionBuffer, SessionSnapshot};
pub use controller::{Decision, ThresholdController};
pub use engine::{spawn_engine, EngineConfig, EngineHandle, EngineState, SessionExport};
pub use error::{EngineError, SensorFault, SessionIntegrityError, StartRejected};
pub use events::{event_channel, EventReceiver, EventSink};
pub use fault::{FaultTransition, SensorFaultState};
pub use retry::{read_with_retry, ReadOutcome, RetryStep, TickRetry};
pub use scheduler::{SamplingScheduler, TickOutcome};
pub use sensor::{SensorHandle, SensorMetadata, SharedSensor, DS18B20_RANGE};

// Re-export types used in trait signatures for convenience
pub use templog_types::{Reading, ReadingValue, SensorFaultKind, SensorId};
