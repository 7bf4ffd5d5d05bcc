//! Live session log: one line per log tick, flushed as it is written

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::table::Row;
use templog_types::{SensorId, TickEvent};

pub struct SessionLogWriter {
    path: PathBuf,
    out: BufWriter<File>,
    columns: Vec<SensorId>,
    lines: usize,
}

impl SessionLogWriter {
    /// Create `path`, laying out values along `columns`
    pub fn create(path: impl Into<PathBuf>, columns: Vec<SensorId>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .with_context(|| format!("Failed to open session log {}", path.display()))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            columns,
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn write_tick(&mut self, tick: &TickEvent) -> Result<()> {
        let row = Row::from_tick(tick.kind, tick.timestamp, &tick.readings, &self.columns);
        writeln!(self.out, "{}", row.to_line())?;
        self.out
            .flush()
            .with_context(|| format!("Failed to write session log {}", self.path.display()))?;
        self.lines += 1;
        Ok(())
    }
}
