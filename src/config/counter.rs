//! Persistent session counter, numbering session folders across runs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterFile {
    #[serde(default)]
    session_counter: u32,
}

/// `counter.json` holding the number of the last session
pub struct SessionCounter {
    path: PathBuf,
}

impl SessionCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Counter kept next to the application config
    pub fn in_config_dir() -> Result<Self> {
        Ok(Self::new(super::AppConfig::config_dir()?.join("counter.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of the last session, 0 if none was recorded
    pub fn current(&self) -> u32 {
        self.read().session_counter
    }

    fn read(&self) -> CounterFile {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Corrupt session counter {}: {}, restarting at 0", self.path.display(), e);
                CounterFile::default()
            }),
            Err(_) => CounterFile::default(),
        }
    }

    /// Increment, persist and return the new counter value
    pub fn next(&self) -> Result<u32> {
        let counter = CounterFile {
            session_counter: self.read().session_counter.saturating_add(1),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string(&counter)?)
            .with_context(|| format!("Failed to write session counter {}", self.path.display()))?;
        Ok(counter.session_counter)
    }
}
