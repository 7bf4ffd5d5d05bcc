//! Session export: folders, live log, and file formats
//!
//! Each session gets its own folder under the measurement folder. A format
//! is rewritten only when the session gained readings since it was last
//! written, unless overwriting is asked for explicitly.

mod naming;
mod session_log;
mod table;
mod writers;

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::SessionCounter;
use templog_core::SessionExport;
use templog_types::{Session, SessionId};

pub use naming::{sanitize_filename, session_file_name, session_folder_name};
pub use session_log::SessionLogWriter;
pub use table::{column_labels, Cell, ExportTable, Row, FAULT_TEXT, FIXED_COLUMNS};

/// Supported export formats
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
    /// Session metadata and per-sensor statistics as JSON
    Summary,
}

impl ExportFormat {
    fn file_name(&self, session: &Session, counter: u32) -> String {
        match self {
            ExportFormat::Csv => session_file_name("temp_data", "csv", session, counter),
            ExportFormat::Json => session_file_name("temp_data", "json", session, counter),
            ExportFormat::Summary => session_file_name("summary", "json", session, counter),
        }
    }

    /// Whether this format carries the readings themselves
    pub fn is_data(&self) -> bool {
        matches!(self, ExportFormat::Csv | ExportFormat::Json)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => f.write_str("CSV"),
            ExportFormat::Json => f.write_str("JSON"),
            ExportFormat::Summary => f.write_str("summary"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no session data to export")]
    NoData,
    #[error("{0} already exported for this session, overwrite to replace it")]
    AlreadyExported(ExportFormat),
    #[error("session counter unavailable: {0}")]
    Counter(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output folder of one session
#[derive(Debug, Clone)]
pub struct SessionFolder {
    pub session_id: SessionId,
    pub path: PathBuf,
    pub counter: u32,
    /// Readings covered by the last file written per format
    exported: BTreeMap<ExportFormat, usize>,
}

impl SessionFolder {
    pub fn is_exported(&self, format: ExportFormat) -> bool {
        self.exported.contains_key(&format)
    }

    /// Whether the file for `format` already holds `readings` readings
    pub fn is_up_to_date(&self, format: ExportFormat, readings: usize) -> bool {
        self.exported
            .get(&format)
            .map(|written| *written >= readings)
            .unwrap_or(false)
    }
}

pub struct ExportCoordinator {
    root: PathBuf,
    counter: SessionCounter,
    current: Option<SessionFolder>,
}

impl ExportCoordinator {
    pub fn new(root: impl Into<PathBuf>, counter: SessionCounter) -> Self {
        Self {
            root: root.into(),
            counter,
            current: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> Option<&SessionFolder> {
        self.current.as_ref()
    }

    /// Create the folder for `session`; repeated calls for the same session
    /// return the existing folder
    pub fn open_session(&mut self, session: &Session) -> Result<&SessionFolder, ExportError> {
        let reuse = self
            .current
            .as_ref()
            .map(|folder| folder.session_id == session.id)
            .unwrap_or(false);

        if !reuse {
            let counter = self
                .counter
                .next()
                .map_err(|e| ExportError::Counter(format!("{:#}", e)))?;
            let path = self.root.join(session_folder_name(session, counter));
            std::fs::create_dir_all(&path)?;
            info!("Session folder: {}", path.display());

            self.current = Some(SessionFolder {
                session_id: session.id.clone(),
                path,
                counter,
                exported: BTreeMap::new(),
            });
        }

        self.current.as_ref().ok_or(ExportError::NoData)
    }

    /// Path of the live log file for `session`
    pub fn log_path(&mut self, session: &Session) -> Result<PathBuf, ExportError> {
        let folder = self.open_session(session)?;
        Ok(folder
            .path
            .join(session_file_name("temp_log", "txt", session, folder.counter)))
    }

    /// Write one format of the exported session into its folder
    pub fn export(
        &mut self,
        export: &SessionExport,
        format: ExportFormat,
        overwrite: bool,
    ) -> Result<PathBuf, ExportError> {
        let session = export.session.as_ref().ok_or(ExportError::NoData)?;
        if export.readings.is_empty() {
            return Err(ExportError::NoData);
        }

        let folder = self.open_session(session)?;
        if folder.is_up_to_date(format, export.readings.len()) && !overwrite {
            return Err(ExportError::AlreadyExported(format));
        }
        let path = folder.path.join(format.file_name(session, folder.counter));

        match format {
            ExportFormat::Csv => writers::write_csv(&path, &ExportTable::from_export(export))?,
            ExportFormat::Json => writers::write_json(&path, &ExportTable::from_export(export))?,
            ExportFormat::Summary => writers::write_summary(&path, session, export)?,
        }

        if let Some(folder) = self.current.as_mut() {
            folder.exported.insert(format, export.readings.len());
        }
        info!("{} exported to {}", format, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use templog_core::SessionBuffer;
    use templog_types::{
        Reading, ReadingValue, SensorFaultKind, SensorId, StopReason, ThresholdConfig,
    };

    fn finished_export() -> SessionExport {
        let ids = vec![SensorId::new("28-a"), SensorId::new("28-b")];
        let mut session = Session::new("oven", ThresholdConfig::none(), None, ids.clone(), Local::now());

        let buffer = Arc::new(SessionBuffer::new(10));
        buffer.begin_session(session.id.clone());
        for tick in 1..=3u64 {
            let at = Local::now();
            let b = if tick == 2 {
                ReadingValue::Fault(SensorFaultKind::Timeout)
            } else {
                ReadingValue::Celsius(30.0)
            };
            buffer
                .append_tick(vec![
                    Reading::new(ids[0].clone(), tick, Duration::from_secs(tick), at, ReadingValue::Celsius(20.0 + tick as f64)),
                    Reading::new(ids[1].clone(), tick, Duration::from_secs(tick), at, b),
                ])
                .unwrap();
        }
        buffer.seal();
        session.close(StopReason::Manual, Local::now());

        let labels: BTreeMap<SensorId, String> = [
            (ids[0].clone(), "Inlet".to_string()),
            (ids[1].clone(), "Outlet".to_string()),
        ]
        .into_iter()
        .collect();

        SessionExport {
            session: Some(session),
            labels,
            readings: buffer.snapshot(),
        }
    }

    fn coordinator(dir: &Path) -> ExportCoordinator {
        ExportCoordinator::new(
            dir.join("TestResults"),
            SessionCounter::new(dir.join("config").join("counter.json")),
        )
    }

    #[test]
    fn test_csv_export_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let path = exports.export(&finished_export(), ExportFormat::Csv, false).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Type,Seconds,Timestamp,Inlet,Outlet");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("LOG,"));
        assert!(lines[1].ends_with(",21.000,30.000"));
        assert!(lines[2].ends_with(",22.000,ERROR"));

        let folder = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(folder.starts_with("oven[AT:001]["));
    }

    #[test]
    fn test_json_export_uses_same_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let path = exports.export(&finished_export(), ExportFormat::Json, false).unwrap();

        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["Type"], "LOG");
        assert_eq!(rows[0]["Inlet"], 21.0);
        assert_eq!(rows[1]["Outlet"], "ERROR");
        assert!(rows[2]["Seconds"].is_i64());
    }

    #[test]
    fn test_second_export_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let export = finished_export();

        let first = exports.export(&export, ExportFormat::Csv, false).unwrap();
        assert!(matches!(
            exports.export(&export, ExportFormat::Csv, false),
            Err(ExportError::AlreadyExported(ExportFormat::Csv))
        ));
        // Other formats are tracked separately
        assert!(exports.export(&export, ExportFormat::Summary, false).is_ok());
        assert_eq!(exports.export(&export, ExportFormat::Csv, true).unwrap(), first);
    }

    #[test]
    fn test_grown_session_exports_again_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let id = SensorId::new("28-a");
        let session = Session::new("oven", ThresholdConfig::none(), None, vec![id.clone()], Local::now());
        let buffer = SessionBuffer::new(10);
        buffer.begin_session(session.id.clone());
        let export_now = |buffer: &SessionBuffer| SessionExport {
            session: Some(session.clone()),
            labels: BTreeMap::new(),
            readings: buffer.snapshot(),
        };
        let append = |buffer: &SessionBuffer, tick: u64| {
            buffer
                .append(Reading::new(id.clone(), tick, Duration::from_secs(tick), Local::now(), ReadingValue::Celsius(20.0)))
                .unwrap();
        };

        append(&buffer, 1);
        let path = exports.export(&export_now(&buffer), ExportFormat::Csv, false).unwrap();
        append(&buffer, 2);
        append(&buffer, 3);
        assert!(!exports.current().unwrap().is_up_to_date(ExportFormat::Csv, 3));

        assert_eq!(exports.export(&export_now(&buffer), ExportFormat::Csv, false).unwrap(), path);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(matches!(
            exports.export(&export_now(&buffer), ExportFormat::Csv, false),
            Err(ExportError::AlreadyExported(ExportFormat::Csv))
        ));
    }

    #[test]
    fn test_folder_reused_within_session_and_counter_advances() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let export = finished_export();
        let session = export.session.clone().unwrap();

        let log = exports.log_path(&session).unwrap();
        let csv = exports.export(&export, ExportFormat::Csv, false).unwrap();
        assert_eq!(log.parent(), csv.parent());
        assert_eq!(exports.current().map(|f| f.counter), Some(1));

        let next = finished_export();
        let next_session = next.session.clone().unwrap();
        exports.open_session(&next_session).unwrap();
        assert_eq!(exports.current().map(|f| f.counter), Some(2));
        assert!(!exports.current().unwrap().is_exported(ExportFormat::Csv));
    }

    #[test]
    fn test_empty_session_has_nothing_to_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let export = SessionExport {
            session: None,
            labels: BTreeMap::new(),
            readings: Default::default(),
        };
        assert!(matches!(
            exports.export(&export, ExportFormat::Csv, false),
            Err(ExportError::NoData)
        ));
    }

    #[test]
    fn test_summary_contains_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let mut exports = coordinator(dir.path());
        let path = exports.export(&finished_export(), ExportFormat::Summary, false).unwrap();

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(summary["summary"]["total_readings"], 6);
        assert_eq!(summary["summary"]["total_faults"], 1);
        assert_eq!(summary["summary"]["sensors"]["28-a"]["max"], 23.0);
        assert_eq!(summary["labels"]["28-b"], "Outlet");
    }
}
