//! templog-sources: Sensor backends for the templog temperature logger.
//!
//! Three kinds of sensors are available: 1-Wire thermometers on the w1
//! sysfs bus, thermal components of the host, and simulated sensors.

mod shared_components;
mod simulated;
mod system;
mod w1;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use templog_core::SharedSensor;

pub use simulated::{SimulatedConfig, SimulatedSensor, WaveMode};
pub use system::{SystemSensor, SYSTEM_ID_PREFIX};
pub use w1::{parse_w1_slave, W1Sensor, DEFAULT_W1_ROOT};

/// Which backends to discover at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    /// Root of the 1-Wire device tree; `None` skips the bus
    #[serde(default = "default_w1_root")]
    pub w1_root: Option<PathBuf>,
    #[serde(default)]
    pub include_system: bool,
    #[serde(default)]
    pub simulated: Vec<SimulatedConfig>,
}

fn default_w1_root() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_W1_ROOT))
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            w1_root: default_w1_root(),
            include_system: false,
            simulated: Vec::new(),
        }
    }
}

/// Initialize shared sensor caches (call once at startup)
pub fn initialize_sensors() {
    shared_components::initialize();
}

/// Discover every configured sensor, in a stable order:
/// 1-Wire by address, then host components, then simulated sensors
pub fn discover_all(options: &DiscoveryOptions) -> Result<Vec<SharedSensor>> {
    let mut sensors: Vec<SharedSensor> = Vec::new();

    if let Some(root) = &options.w1_root {
        let found = w1::discover(root)
            .with_context(|| format!("Failed to scan 1-Wire devices in {}", root.display()))?;
        sensors.extend(found.into_iter().map(|s| Arc::new(s) as SharedSensor));
    }

    if options.include_system {
        sensors.extend(
            system::discover()
                .into_iter()
                .map(|s| Arc::new(s) as SharedSensor),
        );
    }

    sensors.extend(
        options
            .simulated
            .iter()
            .cloned()
            .map(|config| Arc::new(SimulatedSensor::new(config)) as SharedSensor),
    );

    log::info!("Discovered {} sensors", sensors.len());
    Ok(sensors)
}
