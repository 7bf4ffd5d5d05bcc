//! File encoders for exported sessions

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::table::{Cell, ExportTable, FAULT_TEXT};
use super::ExportError;
use templog_core::SessionExport;
use templog_types::{SensorId, Session, SessionSummary};

/// CSV with a `Type,Seconds,Timestamp,<labels...>` header
pub fn write_csv(path: &Path, table: &ExportTable) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;

    for row in &table.rows {
        let mut record = vec![
            row.kind.tag().to_string(),
            row.seconds().to_string(),
            row.timestamp_text(),
        ];
        record.extend(row.cells.iter().map(|cell| cell.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// JSON array with one object per row, keyed by the same columns as the CSV
pub fn write_json(path: &Path, table: &ExportTable) -> Result<(), ExportError> {
    let rows: Vec<Map<String, Value>> = table
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            object.insert(table.headers[0].clone(), Value::from(row.kind.tag()));
            object.insert(table.headers[1].clone(), Value::from(row.seconds()));
            object.insert(table.headers[2].clone(), Value::from(row.timestamp_text()));
            for (header, cell) in table.headers[3..].iter().zip(&row.cells) {
                let value = match cell {
                    Cell::Celsius(celsius) => Value::from(*celsius),
                    Cell::Fault => Value::from(FAULT_TEXT),
                    Cell::Missing => Value::Null,
                };
                object.insert(header.clone(), value);
            }
            object
        })
        .collect();

    write_pretty(path, &rows)
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    session: &'a Session,
    labels: &'a BTreeMap<SensorId, String>,
    summary: SessionSummary,
}

/// Session metadata plus per-sensor statistics
pub fn write_summary(path: &Path, session: &Session, export: &SessionExport) -> Result<(), ExportError> {
    let summary = SummaryFile {
        session,
        labels: &export.labels,
        summary: SessionSummary::from_readings(session, export.readings.iter()),
    };
    write_pretty(path, &summary)
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ExportError> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.flush()?;
    Ok(())
}
