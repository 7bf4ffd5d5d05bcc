//! templog: multi-sensor temperature logger
//!
//! This library provides the application layer on top of the engine:
//! - Configuration, sensor profiles and the session counter
//! - Session folders, the live session log and CSV/JSON exports
//! - The console surface and the event router tying them to the engine

pub mod app;
pub mod config;
pub mod display;
pub mod export;

// Re-export commonly used types
pub use app::{App, Control, SessionReport};
pub use config::{AppConfig, SensorProfile, SessionCounter};
pub use export::{ExportCoordinator, ExportError, ExportFormat};
