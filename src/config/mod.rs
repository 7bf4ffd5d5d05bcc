//! Configuration management

mod counter;
mod profile;
mod settings;

pub use counter::SessionCounter;
pub use profile::{duration_from_hours, SensorProfile};
pub use settings::{AppConfig, CONFIG_VERSION};
