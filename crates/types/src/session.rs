//! Logging session types

use crate::reading::Reading;
use crate::sensor::SensorId;
use crate::threshold::{Bound, ThresholdConfig};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier of a logging session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First six characters, used in folder and file names
    pub fn short(&self) -> &str {
        self.0.get(..6).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What ended a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Stop command from the user
    Manual,
    /// The configured duration limit elapsed
    DurationExpired,
    /// A stop condition was satisfied by a tracked sensor
    Threshold {
        sensor_id: SensorId,
        celsius: f64,
        bound: Bound,
    },
    /// Sampling halted because the session buffer rejected data
    IntegrityFault,
    /// The engine was shut down while the session was running
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Manual => f.write_str("stopped by user"),
            StopReason::DurationExpired => f.write_str("duration limit reached"),
            StopReason::Threshold {
                sensor_id,
                celsius,
                bound,
            } => write!(
                f,
                "temperature threshold {} reached on {} ({:.2}°C)",
                bound, sensor_id, celsius
            ),
            StopReason::IntegrityFault => f.write_str("session data integrity fault"),
            StopReason::Shutdown => f.write_str("engine shut down"),
        }
    }
}

/// One logging run from Start to Stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Measurement name, used for folder and file naming
    pub name: String,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub duration_limit: Option<Duration>,
    pub thresholds: ThresholdConfig,
    pub active_sensors: Vec<SensorId>,
    pub status: SessionStatus,
    pub stop_reason: Option<StopReason>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        thresholds: ThresholdConfig,
        duration_limit: Option<Duration>,
        active_sensors: Vec<SensorId>,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            name: name.into(),
            started_at,
            ended_at: None,
            duration_limit,
            thresholds,
            active_sensors,
            status: SessionStatus::Running,
            stop_reason: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn close(&mut self, reason: StopReason, ended_at: DateTime<Local>) {
        self.status = SessionStatus::Stopped;
        self.ended_at = Some(ended_at);
        self.stop_reason = Some(reason);
    }

    /// Remaining time for a timed session, measured against `now`
    pub fn progress(&self, now: DateTime<Local>) -> Option<SessionProgress> {
        let limit = self.duration_limit?;
        let elapsed = (now - self.started_at).to_std().unwrap_or_default();
        let remaining = limit.saturating_sub(elapsed);
        let fraction = if limit.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / limit.as_secs_f64()).min(1.0)
        };
        let expected_end = chrono::Duration::from_std(limit)
            .ok()
            .and_then(|limit| self.started_at.checked_add_signed(limit));

        Some(SessionProgress {
            elapsed,
            remaining,
            fraction,
            expected_end,
        })
    }
}

/// Progress of a session with a duration limit
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgress {
    pub elapsed: Duration,
    pub remaining: Duration,
    /// 0.0 to 1.0
    pub fraction: f64,
    /// `None` when the limit reaches past the representable calendar
    pub expected_end: Option<DateTime<Local>>,
}

impl SessionProgress {
    /// "Remaining: 1 hr 2 min 3 sec | Expected completion: 2024-01-01 12:00:00"
    pub fn describe(&self) -> String {
        let secs = self.remaining.as_secs();
        let end = match self.expected_end {
            Some(end) => end.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "never".to_string(),
        };
        format!(
            "Remaining: {} hr {} min {} sec | Expected completion: {}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
            end
        )
    }
}

/// Per-sensor statistics over a session's logged readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SensorStats {
    pub readings: usize,
    pub faults: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Summary emitted when a session stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub name: String,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub stop_reason: Option<StopReason>,
    pub total_readings: usize,
    pub total_faults: usize,
    pub sensors: BTreeMap<SensorId, SensorStats>,
}

impl SessionSummary {
    pub fn from_readings<'a>(
        session: &Session,
        readings: impl IntoIterator<Item = &'a Reading>,
    ) -> Self {
        let mut sensors: BTreeMap<SensorId, SensorStats> = BTreeMap::new();
        let mut sums: BTreeMap<SensorId, f64> = BTreeMap::new();
        let mut total_readings = 0;
        let mut total_faults = 0;

        for reading in readings {
            total_readings += 1;
            let stats = sensors.entry(reading.sensor_id.clone()).or_default();
            match reading.celsius() {
                Some(value) => {
                    stats.readings += 1;
                    stats.min = Some(stats.min.map_or(value, |min| min.min(value)));
                    stats.max = Some(stats.max.map_or(value, |max| max.max(value)));
                    *sums.entry(reading.sensor_id.clone()).or_insert(0.0) += value;
                }
                None => {
                    stats.faults += 1;
                    total_faults += 1;
                }
            }
        }

        for (sensor_id, stats) in sensors.iter_mut() {
            if stats.readings > 0 {
                let sum = sums.get(sensor_id).copied().unwrap_or(0.0);
                stats.mean = Some(sum / stats.readings as f64);
            }
        }

        Self {
            session_id: session.id.clone(),
            name: session.name.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            stop_reason: session.stop_reason.clone(),
            total_readings,
            total_faults,
            sensors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{ReadingValue, SensorFaultKind};

    fn session(limit: Option<Duration>) -> Session {
        Session::new(
            "bench",
            ThresholdConfig::none(),
            limit,
            vec![SensorId::new("28-a")],
            Local::now(),
        )
    }

    #[test]
    fn test_short_session_id() {
        let id = SessionId::generate();
        assert_eq!(id.short().len(), 6);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn test_progress_only_for_timed_sessions() {
        let untimed = session(None);
        assert!(untimed.progress(Local::now()).is_none());

        let timed = session(Some(Duration::from_secs(3600)));
        let later = timed.started_at + chrono::Duration::minutes(30);
        let progress = timed.progress(later).unwrap();
        assert!((progress.fraction - 0.5).abs() < 1e-9);
        assert_eq!(progress.remaining, Duration::from_secs(1800));
        assert!(progress.describe().starts_with("Remaining: 0 hr 30 min 0 sec"));
        assert_eq!(progress.expected_end, Some(timed.started_at + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_progress_with_huge_limit_does_not_overflow() {
        let timed = session(Some(Duration::from_secs(u64::MAX / 4)));
        let progress = timed.progress(timed.started_at).unwrap();
        assert_eq!(progress.expected_end, None);
        assert!(progress.describe().ends_with("Expected completion: never"));
        assert!(progress.fraction < 1e-9);
    }

    #[test]
    fn test_summary_statistics() {
        let mut s = session(None);
        s.close(StopReason::Manual, Local::now());
        let id = SensorId::new("28-a");
        let readings: Vec<Reading> = [
            ReadingValue::Celsius(20.0),
            ReadingValue::Fault(SensorFaultKind::Timeout),
            ReadingValue::Celsius(22.0),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            Reading::new(
                id.clone(),
                i as u64 + 1,
                Duration::from_secs(i as u64 + 1),
                Local::now(),
                value,
            )
        })
        .collect();

        let summary = SessionSummary::from_readings(&s, &readings);
        assert_eq!(summary.total_readings, 3);
        assert_eq!(summary.total_faults, 1);
        let stats = &summary.sensors[&id];
        assert_eq!(stats.readings, 2);
        assert_eq!(stats.min, Some(20.0));
        assert_eq!(stats.max, Some(22.0));
        assert_eq!(stats.mean, Some(21.0));
        assert_eq!(summary.stop_reason, Some(StopReason::Manual));
    }
}
