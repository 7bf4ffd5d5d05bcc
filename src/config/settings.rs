//! Application configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::export::{sanitize_filename, ExportFormat};
use templog_core::EngineConfig;
use templog_sources::DiscoveryOptions;
use templog_types::{RetentionPolicy, RetryPolicy, SamplingConfig, SensorId};

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// Application-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the config format
    #[serde(default = "default_version")]
    pub version: u32,
    /// Log cadence in seconds
    #[serde(default = "default_log_interval")]
    pub default_log_interval: u64,
    /// View cadence in seconds; 0 shows log ticks instead
    #[serde(default = "default_view_interval")]
    pub default_view_interval: u64,
    #[serde(default = "default_start_threshold")]
    pub default_start_threshold: f64,
    #[serde(default = "default_stop_threshold")]
    pub default_stop_threshold: f64,
    /// Lines kept on the console log surface
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
    /// Where session folders are created
    #[serde(default = "default_measurement_folder")]
    pub measurement_folder: PathBuf,
    /// Where sensor profiles are kept
    #[serde(default = "default_config_folder")]
    pub config_folder: PathBuf,
    /// Readings kept in memory for live display
    #[serde(default = "default_display_window")]
    pub display_window: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// User labels by sensor address
    #[serde(default)]
    pub sensor_labels: BTreeMap<SensorId, String>,
    #[serde(default)]
    pub discovery: DiscoveryOptions,
    /// Formats written automatically when a session stops
    #[serde(default = "default_auto_export")]
    pub auto_export: Vec<ExportFormat>,
    /// Capacity of the engine event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_log_interval() -> u64 {
    10
}

fn default_view_interval() -> u64 {
    3
}

fn default_start_threshold() -> f64 {
    22.0
}

fn default_stop_threshold() -> f64 {
    30.0
}

fn default_max_log_lines() -> usize {
    500
}

fn default_measurement_folder() -> PathBuf {
    PathBuf::from("TestResults")
}

fn default_config_folder() -> PathBuf {
    PathBuf::from("SensorConfigs")
}

fn default_display_window() -> usize {
    500
}

fn default_auto_export() -> Vec<ExportFormat> {
    vec![ExportFormat::Csv, ExportFormat::Summary]
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_log_interval: default_log_interval(),
            default_view_interval: default_view_interval(),
            default_start_threshold: default_start_threshold(),
            default_stop_threshold: default_stop_threshold(),
            max_log_lines: default_max_log_lines(),
            measurement_folder: default_measurement_folder(),
            config_folder: default_config_folder(),
            display_window: default_display_window(),
            retry: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
            sensor_labels: BTreeMap::new(),
            discovery: DiscoveryOptions::default(),
            auto_export: default_auto_export(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Directory holding `config.json` and `counter.json`
    pub fn config_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "templog", "templog")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a specific file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            log_interval_ms: Duration::from_secs(self.default_log_interval.max(1)).as_millis() as u64,
            display_interval_ms: match self.default_view_interval {
                0 => None,
                secs => Some(secs.saturating_mul(1000)),
            },
            display_window: self.display_window,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sampling: self.sampling(),
            retry: self.retry.clone(),
            retention: self.retention.clone(),
            labels: self.sensor_labels.clone(),
            ..EngineConfig::default()
        }
    }

    /// Store a label for `sensor`, sanitized like a file name
    ///
    /// Returns the label actually stored, or `None` if nothing was left
    /// after sanitizing.
    pub fn set_label(&mut self, sensor: SensorId, label: &str) -> Option<String> {
        let label = sanitize_filename(label);
        if label.is_empty() {
            return None;
        }
        self.sensor_labels.insert(sensor, label.clone());
        Some(label)
    }
}
