//! Sampling scheduler - periodic reads across all active sensors
//!
//! Two cadences share one scheduler: the log cadence feeds the session
//! buffer, the optional view cadence only feeds the display. Within a tick
//! every sensor is read on its own task with its own retry budget; the tick
//! closes once all of them have answered or run out of attempts. Only log
//! ticks count toward disabling a sensor.
//!
//! Configuration updates received while running are queued and applied at
//! the start of the next tick, never in the middle of one.

use crate::fault::{FaultTransition, SensorFaultState};
use crate::retry::{read_with_retry, ReadOutcome};
use crate::sensor::SharedSensor;
use crate::error::SensorFault;
use arc_swap::ArcSwap;
use chrono::{DateTime, Local};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use templog_types::{
    ConfigUpdate, DiagnosticEvent, DiagnosticKind, Reading, ReadingValue, RetryPolicy,
    SamplingConfig, SensorId, SensorIdentity, SensorStatus, SessionStatus, TickKind,
};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Everything one closed tick produced
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub kind: TickKind,
    pub tick: u64,
    /// Offset of the tick from session start
    pub monotonic: Duration,
    pub timestamp: DateTime<Local>,
    /// One reading per sensor read this tick, in sensor order
    pub readings: Vec<Reading>,
    pub diagnostics: Vec<DiagnosticEvent>,
}

pub struct SamplingScheduler {
    sensors: BTreeMap<SensorId, SharedSensor>,
    active: BTreeSet<SensorId>,
    faults: BTreeMap<SensorId, SensorFaultState>,
    sampling: SamplingConfig,
    retry: RetryPolicy,
    pending: Option<ConfigUpdate>,
    labels: Arc<ArcSwap<BTreeMap<SensorId, String>>>,
    statuses: Arc<ArcSwap<BTreeMap<SensorId, SensorStatus>>>,
    status: SessionStatus,
    session_start: Option<Instant>,
    log_timer: Option<Interval>,
    view_timer: Option<Interval>,
    log_ticks: u64,
    view_ticks: u64,
}

impl SamplingScheduler {
    /// Create a scheduler over a fixed set of sensors
    ///
    /// Sensors without an entry in `labels` get `Sensor_<n>` in the order
    /// given.
    pub fn new(
        sensors: Vec<SharedSensor>,
        sampling: SamplingConfig,
        retry: RetryPolicy,
        mut labels: BTreeMap<SensorId, String>,
    ) -> Self {
        let mut by_id = BTreeMap::new();
        for (index, sensor) in sensors.into_iter().enumerate() {
            let id = sensor.id().clone();
            labels
                .entry(id.clone())
                .or_insert_with(|| SensorIdentity::default_label(index));
            if by_id.insert(id.clone(), sensor).is_some() {
                warn!("Duplicate sensor {} ignored", id);
            }
        }
        labels.retain(|id, _| by_id.contains_key(id));

        let statuses = by_id
            .keys()
            .map(|id| (id.clone(), SensorStatus::Inactive))
            .collect();

        Self {
            sensors: by_id,
            active: BTreeSet::new(),
            faults: BTreeMap::new(),
            sampling,
            retry,
            pending: None,
            labels: Arc::new(ArcSwap::from_pointee(labels)),
            statuses: Arc::new(ArcSwap::from_pointee(statuses)),
            status: SessionStatus::Idle,
            session_start: None,
            log_timer: None,
            view_timer: None,
            log_ticks: 0,
            view_ticks: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    pub fn contains(&self, sensor: &SensorId) -> bool {
        self.sensors.contains_key(sensor)
    }

    pub fn sensor_ids(&self) -> impl Iterator<Item = &SensorId> {
        self.sensors.keys()
    }

    /// Shared label map; readers see a consistent map at all times
    pub fn labels(&self) -> Arc<ArcSwap<BTreeMap<SensorId, String>>> {
        Arc::clone(&self.labels)
    }

    /// Shared per-sensor status map, republished after every tick
    pub fn statuses(&self) -> Arc<ArcSwap<BTreeMap<SensorId, SensorStatus>>> {
        Arc::clone(&self.statuses)
    }

    pub fn fault_state(&self, sensor: &SensorId) -> Option<&SensorFaultState> {
        self.faults.get(sensor)
    }

    fn label(&self, sensor: &SensorId) -> String {
        self.labels
            .load()
            .get(sensor)
            .cloned()
            .unwrap_or_else(|| sensor.to_string())
    }

    /// Begin ticking over `active`, first ticks one interval after `now`
    pub fn start(&mut self, active: BTreeSet<SensorId>, now: Instant) -> Vec<DiagnosticEvent> {
        let mut diagnostics = Vec::new();
        if let Some(update) = self.pending.take() {
            diagnostics.extend(self.apply_config(update, None));
        }

        self.faults = active
            .iter()
            .map(|id| (id.clone(), SensorFaultState::new(SensorStatus::Active)))
            .collect();
        self.active = active;
        self.log_ticks = 0;
        self.view_ticks = 0;
        self.session_start = Some(now);
        self.status = SessionStatus::Running;
        self.reset_timers(now);
        self.publish_statuses();

        info!(
            "Sampling {} sensors every {:?} (view: {:?})",
            self.active.len(),
            self.sampling.log_interval(),
            self.sampling.display_interval()
        );
        diagnostics
    }

    /// Stop scheduling ticks. In-flight reads are owned by the caller's
    /// current `run_tick` and finish normally.
    pub fn stop(&mut self) {
        self.status = SessionStatus::Stopped;
        self.log_timer = None;
        self.view_timer = None;
        if let Some(update) = self.pending.take() {
            self.apply_config(update, None);
        }
    }

    /// Queue a configuration update for the next tick boundary
    ///
    /// Outside a session there is no tick in flight, so interval and label
    /// changes apply immediately; the active set comes from the next Start.
    pub fn queue_config(&mut self, update: ConfigUpdate) -> Vec<DiagnosticEvent> {
        if self.status == SessionStatus::Running {
            debug!("Config update queued for next tick");
            match self.pending.as_mut() {
                Some(pending) => pending.merge(update),
                None => self.pending = Some(update),
            }
            Vec::new()
        } else {
            self.apply_config(update, None)
        }
    }

    fn apply_config(&mut self, update: ConfigUpdate, at: Option<Instant>) -> Vec<DiagnosticEvent> {
        let mut diagnostics = Vec::new();
        let mut reschedule = false;

        if let Some(ms) = update.log_interval_ms {
            self.sampling.log_interval_ms = ms;
            reschedule = true;
        }
        if let Some(display) = update.display_interval_ms {
            self.sampling.display_interval_ms = display;
            reschedule = true;
        }

        if !update.labels.is_empty() {
            let mut labels = BTreeMap::clone(&self.labels.load());
            for (id, label) in update.labels {
                if self.sensors.contains_key(&id) {
                    labels.insert(id, label);
                } else {
                    warn!("Ignoring label for unknown sensor {}", id);
                }
            }
            self.labels.store(Arc::new(labels));
        }

        if self.status == SessionStatus::Running {
            for id in update.enable {
                if !self.sensors.contains_key(&id) {
                    warn!("Ignoring enable for unknown sensor {}", id);
                    continue;
                }
                let was_disabled = self.faults.get(&id).map(|f| f.is_disabled()).unwrap_or(false);
                if self.active.insert(id.clone()) || was_disabled {
                    self.faults
                        .insert(id.clone(), SensorFaultState::new(SensorStatus::Active));
                    let message = format!("{} joins sampling from the next tick", self.label(&id));
                    diagnostics.push(DiagnosticEvent::for_sensor(id, DiagnosticKind::SensorEnabled, message));
                }
            }
            for id in update.disable {
                if self.active.remove(&id) {
                    if let Some(state) = self.faults.get_mut(&id) {
                        state.status = SensorStatus::Inactive;
                    }
                    let message = format!("{} removed from sampling", self.label(&id));
                    diagnostics.push(DiagnosticEvent::for_sensor(
                        id,
                        DiagnosticKind::SensorDeactivated,
                        message,
                    ));
                }
            }
            if reschedule {
                if let Some(at) = at {
                    self.reset_timers(at);
                }
            }
            self.publish_statuses();
        } else if !update.enable.is_empty() || !update.disable.is_empty() {
            debug!("Active set changes ignored outside a session");
        }

        diagnostics.push(DiagnosticEvent::engine(
            DiagnosticKind::ConfigApplied,
            format!(
                "Configuration applied (log every {:?}, view every {:?})",
                self.sampling.log_interval(),
                self.sampling.display_interval()
            ),
        ));
        diagnostics
    }

    fn reset_timers(&mut self, from: Instant) {
        let log_every = self.sampling.log_interval();
        let mut log_timer = tokio::time::interval_at(from + log_every, log_every);
        log_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.log_timer = Some(log_timer);

        self.view_timer = self.sampling.display_interval().map(|view_every| {
            let mut timer = tokio::time::interval_at(from + view_every, view_every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
    }

    fn publish_statuses(&self) {
        let statuses = self
            .sensors
            .keys()
            .map(|id| {
                let status = match self.faults.get(id) {
                    Some(state) if state.is_disabled() => SensorStatus::Disabled,
                    _ if self.active.contains(id) => SensorStatus::Active,
                    _ => SensorStatus::Inactive,
                };
                (id.clone(), status)
            })
            .collect();
        self.statuses.store(Arc::new(statuses));
    }

    /// Wait for the next due tick. Pending forever unless running.
    ///
    /// Cancel safe: dropping the future does not lose a tick.
    pub async fn next_tick(&mut self) -> (TickKind, Instant) {
        let Self {
            log_timer,
            view_timer,
            ..
        } = self;

        tokio::select! {
            biased;
            at = wait_for(log_timer) => (TickKind::Log, at),
            at = wait_for(view_timer) => (TickKind::View, at),
        }
    }

    /// Read every active sensor once, with retries, and close the tick
    pub async fn run_tick(&mut self, kind: TickKind, at: Instant) -> TickOutcome {
        let started = Instant::now();
        let mut diagnostics = Vec::new();
        if let Some(update) = self.pending.take() {
            diagnostics.extend(self.apply_config(update, Some(at)));
        }

        let tick = match kind {
            TickKind::Log => {
                self.log_ticks += 1;
                self.log_ticks
            }
            TickKind::View => {
                self.view_ticks += 1;
                self.view_ticks
            }
        };
        let monotonic = self
            .session_start
            .map(|start| at.saturating_duration_since(start))
            .unwrap_or_default();
        let timestamp = Local::now();

        let due: Vec<SensorId> = self
            .active
            .iter()
            .filter(|id| !self.faults.get(*id).map(|f| f.is_disabled()).unwrap_or(false))
            .cloned()
            .collect();
        let outcomes = self.read_all(&due).await;

        let mut readings = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let value = match kind {
                TickKind::Log => self.record_outcome(&outcome, monotonic, timestamp, &mut diagnostics),
                TickKind::View => view_value(&outcome),
            };
            readings.push(Reading::new(outcome.sensor_id, tick, monotonic, timestamp, value));
        }
        self.publish_statuses();

        trace!(
            "{} tick {} took {:?} for {} sensors",
            kind.tag(),
            tick,
            started.elapsed(),
            readings.len()
        );

        TickOutcome {
            kind,
            tick,
            monotonic,
            timestamp,
            readings,
            diagnostics,
        }
    }

    /// Update fault bookkeeping for one sensor and produce its reading value
    fn record_outcome(
        &mut self,
        outcome: &ReadOutcome,
        monotonic: Duration,
        timestamp: DateTime<Local>,
        diagnostics: &mut Vec<DiagnosticEvent>,
    ) -> ReadingValue {
        let label = self.label(&outcome.sensor_id);
        let disable_after = self.retry.disable_after_ticks;
        let state = self
            .faults
            .entry(outcome.sensor_id.clone())
            .or_insert_with(|| SensorFaultState::new(SensorStatus::Active));

        match &outcome.result {
            Ok(celsius) => {
                let transition = state.record_success(outcome.faults.len(), monotonic, timestamp);
                if let FaultTransition::Recovered { after_failed_ticks } = transition {
                    diagnostics.push(DiagnosticEvent::for_sensor(
                        outcome.sensor_id.clone(),
                        DiagnosticKind::Recovered,
                        format!("{} recovered after {} failed ticks", label, after_failed_ticks),
                    ));
                }
                ReadingValue::Celsius(*celsius)
            }
            Err(fault) => {
                diagnostics.push(DiagnosticEvent::for_sensor(
                    outcome.sensor_id.clone(),
                    DiagnosticKind::ReadFailed(fault.kind),
                    format!("{}: {} attempts failed, last: {}", label, outcome.attempts, fault),
                ));
                if state.record_failed_tick(outcome.faults.len(), disable_after) == FaultTransition::Disabled {
                    diagnostics.push(DiagnosticEvent::for_sensor(
                        outcome.sensor_id.clone(),
                        DiagnosticKind::SensorDisabled,
                        format!(
                            "{} disabled after {} consecutive failed ticks",
                            label, state.consecutive_failed_ticks
                        ),
                    ));
                }
                ReadingValue::Fault(fault.kind)
            }
        }
    }

    /// Fan out one read task per sensor and collect results in input order
    ///
    /// Deadlines derive from the log interval on both cadences, floored at
    /// each sensor's own read time.
    async fn read_all(&self, sensors: &[SensorId]) -> Vec<ReadOutcome> {
        let interval = self.sampling.log_interval();
        let mut tasks = Vec::with_capacity(sensors.len());

        for id in sensors {
            let Some(sensor) = self.sensors.get(id) else {
                continue;
            };
            let timeout = self.retry.read_timeout(interval, sensor.metadata().min_read_time);
            let sensor = Arc::clone(sensor);
            let policy = self.retry.clone();
            let task = tokio::spawn(async move { read_with_retry(sensor, &policy, timeout).await });
            tasks.push((id.clone(), task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!("Read task for {} failed: {}", id, e);
                    let fault = SensorFault::io(format!("read task failed: {}", e));
                    outcomes.push(ReadOutcome {
                        sensor_id: id,
                        result: Err(fault.clone()),
                        attempts: 1,
                        faults: vec![fault],
                    });
                }
            }
        }
        outcomes
    }

    /// One read of each given sensor outside any session, for start gating
    pub async fn sample_once(&self, sensors: &BTreeSet<SensorId>) -> Vec<Reading> {
        let ids: Vec<SensorId> = sensors.iter().cloned().collect();
        let outcomes = self.read_all(&ids).await;
        let timestamp = Local::now();

        outcomes
            .into_iter()
            .map(|outcome| {
                let value = match outcome.result {
                    Ok(celsius) => ReadingValue::Celsius(celsius),
                    Err(fault) => ReadingValue::Fault(fault.kind),
                };
                Reading::new(outcome.sensor_id, 0, Duration::ZERO, timestamp, value)
            })
            .collect()
    }
}

/// View ticks only feed the display; their faults never count toward
/// disabling a sensor
fn view_value(outcome: &ReadOutcome) -> ReadingValue {
    match &outcome.result {
        Ok(celsius) => ReadingValue::Celsius(*celsius),
        Err(fault) => {
            debug!("{}: view read failed: {}", outcome.sensor_id, fault);
            ReadingValue::Fault(fault.kind)
        }
    }
}

async fn wait_for(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}
