//! Tabular view of a session: one row per tick, one column per sensor
//!
//! Shared by the file exporters, the live session log and the console, so
//! all of them agree on column order and value formatting.

use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use templog_core::SessionExport;
use templog_types::{Reading, ReadingValue, SensorId, TickKind};

/// Leading columns before the per-sensor ones
pub const FIXED_COLUMNS: [&str; 3] = ["Type", "Seconds", "Timestamp"];

/// Text written in place of a value whose read failed
pub const FAULT_TEXT: &str = "ERROR";

/// One sensor's value in one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Celsius(f64),
    /// Every attempt failed for this tick
    Fault,
    /// The sensor was not read this tick
    Missing,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Celsius(celsius) => write!(f, "{:.3}", celsius),
            Cell::Fault => f.write_str(FAULT_TEXT),
            Cell::Missing => Ok(()),
        }
    }
}

impl From<&ReadingValue> for Cell {
    fn from(value: &ReadingValue) -> Self {
        match value {
            ReadingValue::Celsius(celsius) => Cell::Celsius(*celsius),
            ReadingValue::Fault(_) => Cell::Fault,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub kind: TickKind,
    pub timestamp: DateTime<Local>,
    pub cells: Vec<Cell>,
}

impl Row {
    /// Lay out one tick's readings along `columns`
    pub fn from_tick<'a>(
        kind: TickKind,
        timestamp: DateTime<Local>,
        readings: impl IntoIterator<Item = &'a Reading>,
        columns: &[SensorId],
    ) -> Self {
        let by_sensor: BTreeMap<&SensorId, &ReadingValue> =
            readings.into_iter().map(|r| (&r.sensor_id, &r.value)).collect();
        let cells = columns
            .iter()
            .map(|id| by_sensor.get(id).map(|v| Cell::from(*v)).unwrap_or(Cell::Missing))
            .collect();
        Self {
            kind,
            timestamp,
            cells,
        }
    }

    pub fn seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }

    pub fn timestamp_text(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// `LOG,{seconds},{timestamp},{v1},{v2},...`
    pub fn to_line(&self) -> String {
        let mut line = format!("{},{},{}", self.kind.tag(), self.seconds(), self.timestamp_text());
        for cell in &self.cells {
            line.push(',');
            line.push_str(&cell.to_string());
        }
        line
    }
}

/// A whole session laid out for export
#[derive(Debug, Clone)]
pub struct ExportTable {
    pub sensors: Vec<SensorId>,
    /// Column headers, fixed ones first
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl ExportTable {
    pub fn from_export(export: &SessionExport) -> Self {
        // Sensors enabled mid-session only show up in the readings
        let mut sensors: BTreeSet<SensorId> = export
            .session
            .as_ref()
            .map(|s| s.active_sensors.iter().cloned().collect())
            .unwrap_or_default();
        sensors.extend(export.readings.iter().map(|r| r.sensor_id.clone()));
        let sensors: Vec<SensorId> = sensors.into_iter().collect();

        let headers = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(column_labels(&sensors, &export.labels))
            .collect();

        // The buffer only holds log ticks; view readings never reach an export
        let rows = export
            .readings
            .ticks()
            .filter(|tick| !tick.is_empty())
            .map(|tick| Row::from_tick(TickKind::Log, tick[0].timestamp, tick, &sensors))
            .collect();

        Self {
            sensors,
            headers,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Display labels for `sensors`, made unique so they can key JSON objects
pub fn column_labels(sensors: &[SensorId], labels: &BTreeMap<SensorId, String>) -> Vec<String> {
    let names: Vec<String> = sensors
        .iter()
        .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.to_string()))
        .collect();

    names
        .iter()
        .zip(sensors)
        .map(|(name, id)| {
            let clashes = names.iter().filter(|other| *other == name).count() > 1
                || FIXED_COLUMNS.contains(&name.as_str());
            if clashes {
                format!("{} ({})", name, id)
            } else {
                name.clone()
            }
        })
        .collect()
}
