//! Console surface: live reading lines, diagnostics and session progress
//!
//! Keeps the most recent `max_lines` lines so a front end can redraw the
//! log, and writes every line to its output as it arrives.

use chrono::Local;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};

use crate::export::{column_labels, Row, FIXED_COLUMNS};
use templog_types::{
    EngineEvent, Session, SensorId, SensorStatus, SessionStatus, TickEvent, TickKind,
};

pub struct ConsoleDisplay {
    out: Box<dyn Write + Send>,
    lines: VecDeque<String>,
    max_lines: usize,
    columns: Vec<SensorId>,
    session: Option<Session>,
}

impl ConsoleDisplay {
    pub fn new(out: Box<dyn Write + Send>, max_lines: usize) -> Self {
        Self {
            out,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
            max_lines: max_lines.max(1),
            columns: Vec::new(),
            session: None,
        }
    }

    pub fn stdout(max_lines: usize) -> Self {
        Self::new(Box::new(io::stdout()), max_lines)
    }

    /// Lines currently kept, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Reset columns for `session` and print the header
    pub fn begin_session(
        &mut self,
        session: &Session,
        labels: &BTreeMap<SensorId, String>,
    ) -> io::Result<()> {
        self.columns = session.active_sensors.clone();
        self.session = Some(session.clone());
        self.push(format!("Session '{}' started ({})", session.name, session.id))?;
        self.header(labels)
    }

    pub fn handle(&mut self, event: &EngineEvent, labels: &BTreeMap<SensorId, String>) -> io::Result<()> {
        match event {
            EngineEvent::Tick(tick) => self.tick(tick, labels),
            EngineEvent::Diagnostic(diag) => {
                let line = match &diag.sensor_id {
                    Some(sensor) => format!("! {}: {}", label_of(sensor, labels), diag.message),
                    None => format!("! {}", diag.message),
                };
                self.push(line)
            }
            EngineEvent::SessionState(state) => match (state.status, &state.reason) {
                (SessionStatus::Stopped, Some(reason)) => {
                    self.session = None;
                    self.push(format!("Session stopped: {}", reason))
                }
                (status, _) => self.push(format!("Session {}", status)),
            },
            EngineEvent::Summary(summary) => {
                self.push(format!(
                    "{} readings, {} faults",
                    summary.total_readings, summary.total_faults
                ))?;
                for (sensor, stats) in &summary.sensors {
                    let line = match (stats.min, stats.max, stats.mean) {
                        (Some(min), Some(max), Some(mean)) => format!(
                            "  {}: min {:.3} max {:.3} mean {:.3} ({} faults)",
                            label_of(sensor, labels),
                            min,
                            max,
                            mean,
                            stats.faults
                        ),
                        _ => format!("  {}: no valid readings ({} faults)", label_of(sensor, labels), stats.faults),
                    };
                    self.push(line)?;
                }
                Ok(())
            }
        }
    }

    fn tick(&mut self, tick: &TickEvent, labels: &BTreeMap<SensorId, String>) -> io::Result<()> {
        let before = self.columns.len();
        for reading in &tick.readings {
            if !self.columns.contains(&reading.sensor_id) {
                self.columns.push(reading.sensor_id.clone());
            }
        }
        if self.columns.len() != before {
            self.header(labels)?;
        }

        let row = Row::from_tick(tick.kind, tick.timestamp, &tick.readings, &self.columns);
        self.push(row.to_line())?;

        if tick.kind == TickKind::Log {
            if let Some(progress) = self.session.as_ref().and_then(|s| s.progress(Local::now())) {
                self.push(progress.describe())?;
            }
        }
        Ok(())
    }

    fn header(&mut self, labels: &BTreeMap<SensorId, String>) -> io::Result<()> {
        let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(column_labels(&self.columns, labels));
        self.push(header.join(","))
    }

    fn push(&mut self, line: String) -> io::Result<()> {
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        Ok(())
    }
}

fn label_of<'a>(sensor: &'a SensorId, labels: &'a BTreeMap<SensorId, String>) -> &'a str {
    labels.get(sensor).map(String::as_str).unwrap_or(sensor.as_str())
}

/// One line per sensor: id, label and state
pub fn status_table(
    statuses: &BTreeMap<SensorId, SensorStatus>,
    labels: &BTreeMap<SensorId, String>,
) -> String {
    let width = statuses.keys().map(|id| id.as_str().len()).max().unwrap_or(0);
    statuses
        .iter()
        .map(|(id, status)| {
            format!(
                "{:<width$}  {:<20}  {}",
                id.as_str(),
                label_of(id, labels),
                status.as_str(),
                width = width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use templog_types::{
        DiagnosticEvent, DiagnosticKind, Reading, ReadingValue, SensorFaultKind, SessionStateEvent,
        StopReason, ThresholdConfig,
    };

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn session(ids: &[&str]) -> Session {
        Session::new(
            "oven",
            ThresholdConfig::none(),
            None,
            ids.iter().map(|id| SensorId::new(*id)).collect(),
            Local::now(),
        )
    }

    fn tick(session: &Session, kind: TickKind, n: u64, values: &[(&str, ReadingValue)]) -> EngineEvent {
        let timestamp = Local::now();
        EngineEvent::Tick(TickEvent {
            session_id: session.id.clone(),
            kind,
            tick: n,
            monotonic: Duration::from_secs(n),
            timestamp,
            readings: values
                .iter()
                .map(|(id, v)| Reading::new(SensorId::new(*id), n, Duration::from_secs(n), timestamp, *v))
                .collect(),
        })
    }

    fn labels() -> BTreeMap<SensorId, String> {
        [(SensorId::new("28-a"), "Inlet".to_string())].into_iter().collect()
    }

    #[test]
    fn test_tick_lines_follow_header() {
        let out = Captured::default();
        let mut display = ConsoleDisplay::new(Box::new(out.clone()), 100);
        let session = session(&["28-a", "28-b"]);

        display.begin_session(&session, &labels()).unwrap();
        display
            .handle(
                &tick(&session, TickKind::View, 1, &[
                    ("28-a", ReadingValue::Celsius(21.5)),
                    ("28-b", ReadingValue::Fault(SensorFaultKind::Timeout)),
                ]),
                &labels(),
            )
            .unwrap();

        let text = out.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "Type,Seconds,Timestamp,Inlet,28-b");
        assert!(lines[2].starts_with("VIEW,"));
        assert!(lines[2].ends_with(",21.500,ERROR"));
    }

    #[test]
    fn test_new_sensor_reprints_header() {
        let mut display = ConsoleDisplay::new(Box::new(io::sink()), 100);
        let session = session(&["28-a"]);
        display.begin_session(&session, &labels()).unwrap();

        display
            .handle(
                &tick(&session, TickKind::Log, 1, &[
                    ("28-a", ReadingValue::Celsius(20.0)),
                    ("28-c", ReadingValue::Celsius(25.0)),
                ]),
                &labels(),
            )
            .unwrap();

        let lines: Vec<&str> = display.lines().collect();
        assert_eq!(lines[2], "Type,Seconds,Timestamp,Inlet,28-c");
        assert!(lines[3].ends_with(",20.000,25.000"));
    }

    #[test]
    fn test_keeps_only_recent_lines() {
        let mut display = ConsoleDisplay::new(Box::new(io::sink()), 3);
        for i in 0..5 {
            let event = EngineEvent::Diagnostic(DiagnosticEvent::engine(
                DiagnosticKind::ConfigApplied,
                format!("update {}", i),
            ));
            display.handle(&event, &BTreeMap::new()).unwrap();
        }
        let lines: Vec<&str> = display.lines().collect();
        assert_eq!(lines, vec!["! update 2", "! update 3", "! update 4"]);
    }

    #[test]
    fn test_timed_session_shows_progress_on_log_ticks() {
        let mut display = ConsoleDisplay::new(Box::new(io::sink()), 100);
        let mut session = session(&["28-a"]);
        session.duration_limit = Some(Duration::from_secs(3600));
        display.begin_session(&session, &labels()).unwrap();

        display
            .handle(&tick(&session, TickKind::Log, 1, &[("28-a", ReadingValue::Celsius(20.0))]), &labels())
            .unwrap();
        assert!(display.lines().last().unwrap().starts_with("Remaining: "));

        display
            .handle(
                &EngineEvent::SessionState(SessionStateEvent {
                    session_id: session.id.clone(),
                    status: SessionStatus::Stopped,
                    reason: Some(StopReason::Manual),
                    timestamp: Local::now(),
                }),
                &labels(),
            )
            .unwrap();
        display
            .handle(&tick(&session, TickKind::Log, 2, &[("28-a", ReadingValue::Celsius(20.0))]), &labels())
            .unwrap();
        assert!(display.lines().last().unwrap().starts_with("LOG,"));
    }

    #[test]
    fn test_status_table_marks_disabled() {
        let statuses: BTreeMap<SensorId, SensorStatus> = [
            (SensorId::new("28-a"), SensorStatus::Active),
            (SensorId::new("28-b"), SensorStatus::Disabled),
        ]
        .into_iter()
        .collect();
        let table = status_table(&statuses, &labels());
        let rows: Vec<&str> = table.lines().collect();
        assert!(rows[0].contains("Inlet"));
        assert!(rows[1].ends_with("DISABLED"));
    }
}
