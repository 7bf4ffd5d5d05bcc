//! Engine task - owns the scheduler, controller and session lifecycle
//!
//! The engine runs as a single tokio task. Commands arrive over an mpsc
//! channel and are handled between ticks, so a Stop never lands in the
//! middle of a tick: the readings of the tick in flight are appended and
//! emitted first, then the session closes.
//!
//! Consumers talk to the engine through a cloneable [`EngineHandle`]. Reads
//! of session data go straight to the shared [`SessionBuffer`] and never
//! wait on the engine task.

use crate::buffer::{SessionBuffer, SessionSnapshot};
use crate::controller::{Decision, ThresholdController};
use crate::error::{EngineError, SessionIntegrityError, StartRejected};
use crate::events::EventSink;
use crate::scheduler::{SamplingScheduler, TickOutcome};
use crate::sensor::SharedSensor;
use arc_swap::ArcSwap;
use chrono::Local;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use templog_types::{
    ConfigUpdate, DiagnosticEvent, DiagnosticKind, EngineEvent, Reading, RetentionPolicy,
    RetryPolicy, SamplingConfig, SensorId, SensorStatus, Session, SessionStateEvent,
    SessionStatus, SessionSummary, StartCommand, StopCommand, StopReason, TickEvent, TickKind,
    UnexportedDataPolicy,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Static engine configuration, fixed at spawn time
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sampling: SamplingConfig,
    pub retry: RetryPolicy,
    pub retention: RetentionPolicy,
    /// Initial labels; sensors missing here get `Sensor_<n>`
    pub labels: BTreeMap<SensorId, String>,
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            retry: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
            labels: BTreeMap::new(),
            command_capacity: 32,
        }
    }
}

/// Published engine state, readable without waiting on the engine task
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub status: SessionStatus,
    /// The running session, or the last one once it stopped
    pub session: Option<Session>,
    /// Set after an integrity fault; no further sessions can start
    pub halted: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            session: None,
            halted: false,
        }
    }
}

/// Everything an exporter needs, captured at one point in time
#[derive(Debug, Clone)]
pub struct SessionExport {
    pub session: Option<Session>,
    pub labels: BTreeMap<SensorId, String>,
    pub readings: SessionSnapshot,
}

enum Command {
    Start(StartCommand, oneshot::Sender<Result<Session, EngineError>>),
    Stop(StopCommand, oneshot::Sender<Result<Session, EngineError>>),
    Configure(ConfigUpdate),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    buffer: Arc<SessionBuffer>,
    labels: Arc<ArcSwap<BTreeMap<SensorId, String>>>,
    statuses: Arc<ArcSwap<BTreeMap<SensorId, SensorStatus>>>,
    state: watch::Receiver<EngineState>,
}

impl EngineHandle {
    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Open a new session. Resolves once the session is running or refused.
    pub async fn start(&self, command: StartCommand) -> Result<Session, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Start(command, reply)).await?;
        response.await.map_err(|_| EngineError::Closed)?
    }

    /// Stop the running session manually
    pub async fn stop(&self) -> Result<Session, EngineError> {
        self.stop_with(StopCommand::manual()).await
    }

    pub async fn stop_with(&self, command: StopCommand) -> Result<Session, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stop(command, reply)).await?;
        response.await.map_err(|_| EngineError::Closed)?
    }

    /// Queue a configuration update for the next tick boundary
    pub async fn apply_config(&self, update: ConfigUpdate) -> Result<(), EngineError> {
        if update.is_empty() {
            return Ok(());
        }
        self.send(Command::Configure(update)).await
    }

    /// Stop any running session and end the engine task
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (done, finished) = oneshot::channel();
        self.send(Command::Shutdown(done)).await?;
        finished.await.map_err(|_| EngineError::Closed)
    }

    /// All logged readings of the current or last session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.buffer.snapshot()
    }

    pub fn export_view(&self) -> SessionExport {
        SessionExport {
            session: self.state.borrow().session.clone(),
            labels: BTreeMap::clone(&self.labels.load()),
            readings: self.buffer.snapshot(),
        }
    }

    /// The most recent `n` logged readings, oldest first
    pub fn recent_window(&self, n: usize) -> Vec<Reading> {
        self.buffer.recent_window(n)
    }

    pub fn labels(&self) -> Arc<BTreeMap<SensorId, String>> {
        self.labels.load_full()
    }

    pub fn sensor_statuses(&self) -> Arc<BTreeMap<SensorId, SensorStatus>> {
        self.statuses.load_full()
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    /// Wait until no session is running
    pub async fn wait_until_stopped(&self) -> Result<EngineState, EngineError> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| s.status != SessionStatus::Running)
            .await
            .map_err(|_| EngineError::Closed)?;
        Ok(settled.clone())
    }

    /// Record that the readings in `snapshot` have been persisted
    pub fn mark_exported(&self, snapshot: &SessionSnapshot) {
        self.buffer.mark_exported(snapshot);
    }
}

/// Spawn the engine task on the current tokio runtime
pub fn spawn_engine(
    sensors: Vec<SharedSensor>,
    config: EngineConfig,
    events: EventSink,
) -> (EngineHandle, JoinHandle<()>) {
    let buffer = Arc::new(SessionBuffer::new(config.sampling.display_window));
    let scheduler = SamplingScheduler::new(sensors, config.sampling, config.retry, config.labels);
    let (state_tx, state_rx) = watch::channel(EngineState::default());
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));

    let handle = EngineHandle {
        commands: command_tx,
        buffer: Arc::clone(&buffer),
        labels: scheduler.labels(),
        statuses: scheduler.statuses(),
        state: state_rx,
    };

    let engine = Engine {
        scheduler,
        controller: ThresholdController::new(),
        buffer,
        retention: config.retention,
        events,
        state: state_tx,
        session: None,
        halted: false,
    };
    let task = tokio::spawn(engine.run(command_rx));

    (handle, task)
}

struct Engine {
    scheduler: SamplingScheduler,
    controller: ThresholdController,
    buffer: Arc<SessionBuffer>,
    retention: RetentionPolicy,
    events: EventSink,
    state: watch::Sender<EngineState>,
    /// The running session; the last stopped one lives in the published state
    session: Option<Session>,
    halted: bool,
}

impl Engine {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Engine started");
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("All engine handles dropped");
                        self.finish_session(StopReason::Shutdown);
                        break;
                    }
                },
                (kind, at) = self.scheduler.next_tick() => self.on_tick(kind, at).await,
            }
        }
        info!("Engine stopped");
    }

    /// Returns false once the engine should exit
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start(start, reply) => {
                let result = self.start_session(start).await;
                if let Err(e) = &result {
                    warn!("Start rejected: {}", e);
                }
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::Stop(stop, reply) => {
                let result = self.finish_session(stop.reason).ok_or(EngineError::NotRunning);
                let _ = reply.send(result);
            }
            Command::Configure(update) => {
                for diagnostic in self.scheduler.queue_config(update) {
                    self.emit_diagnostic(diagnostic);
                }
            }
            Command::Shutdown(done) => {
                self.finish_session(StopReason::Shutdown);
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    async fn start_session(&mut self, start: StartCommand) -> Result<Session, StartRejected> {
        if self.halted {
            return Err(StartRejected::EngineHalted);
        }
        if self.session.is_some() {
            return Err(StartRejected::AlreadyRunning);
        }
        if start.active_sensors.is_empty() {
            return Err(StartRejected::NoActiveSensors);
        }
        if let Some(unknown) = start
            .active_sensors
            .iter()
            .find(|id| !self.scheduler.contains(id))
        {
            return Err(StartRejected::UnknownSensor(unknown.clone()));
        }
        start.thresholds.validate()?;

        let unexported = self.buffer.unexported_len();
        if unexported > 0 && self.retention.on_new_session == UnexportedDataPolicy::Reject {
            return Err(StartRejected::UnexportedData {
                readings: unexported,
            });
        }

        let gate_readings = match start.thresholds.start {
            Some(_) => {
                let readings = self.scheduler.sample_once(&start.active_sensors).await;
                ThresholdController::check_start(&start.thresholds, &readings)?;
                Some(readings)
            }
            None => None,
        };

        let session = Session::new(
            start.name,
            start.thresholds.clone(),
            start.duration_limit,
            start.active_sensors.iter().cloned().collect(),
            Local::now(),
        );

        let discarded = self.buffer.begin_session(session.id.clone());
        if discarded > 0 {
            self.emit_diagnostic(DiagnosticEvent::engine(
                DiagnosticKind::DataDiscarded {
                    readings: discarded,
                },
                format!("Discarded {} unexported readings of the previous session", discarded),
            ));
        }

        self.controller
            .begin_session(start.thresholds, start.duration_limit);
        if let Some(readings) = gate_readings {
            self.controller.observe(&readings);
        }
        for diagnostic in self.scheduler.start(start.active_sensors, Instant::now()) {
            self.emit_diagnostic(diagnostic);
        }

        info!(
            "Session {} '{}' started with {} sensors",
            session.id,
            session.name,
            session.active_sensors.len()
        );
        self.session = Some(session.clone());
        // Published first so event consumers can look the session up
        self.publish(Some(session.clone()));
        self.events.emit(EngineEvent::SessionState(SessionStateEvent {
            session_id: session.id.clone(),
            status: SessionStatus::Running,
            reason: None,
            timestamp: session.started_at,
        }));

        Ok(session)
    }

    async fn on_tick(&mut self, kind: TickKind, at: Instant) {
        let TickOutcome {
            kind,
            tick,
            monotonic,
            timestamp,
            readings,
            diagnostics,
        } = self.scheduler.run_tick(kind, at).await;

        for diagnostic in diagnostics {
            self.emit_diagnostic(diagnostic);
        }
        let Some(session_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            return;
        };

        if kind == TickKind::Log {
            if let Err(e) = self.buffer.append_tick(readings.clone()) {
                self.halt(e);
                return;
            }
        }

        let decision = self.controller.evaluate(monotonic, &readings);
        self.events.emit(EngineEvent::Tick(TickEvent {
            session_id,
            kind,
            tick,
            monotonic,
            timestamp,
            readings,
        }));

        if let Decision::Stop(reason) = decision {
            self.finish_session(reason);
        }
    }

    /// Close the running session, if any, and return it
    fn finish_session(&mut self, reason: StopReason) -> Option<Session> {
        let mut session = self.session.take()?;

        self.scheduler.stop();
        self.controller.end_session();
        self.buffer.seal();
        session.close(reason.clone(), Local::now());
        self.publish(Some(session.clone()));

        self.events.emit(EngineEvent::SessionState(SessionStateEvent {
            session_id: session.id.clone(),
            status: SessionStatus::Stopped,
            reason: Some(reason),
            timestamp: session.ended_at.unwrap_or_else(Local::now),
        }));
        let snapshot = self.buffer.snapshot();
        self.events
            .emit(EngineEvent::Summary(SessionSummary::from_readings(&session, snapshot.iter())));

        Some(session)
    }

    fn halt(&mut self, err: SessionIntegrityError) {
        error!("Session buffer integrity fault, halting: {}", err);
        self.emit_diagnostic(DiagnosticEvent::engine(
            DiagnosticKind::IntegrityFault,
            format!("Sampling halted: {}", err),
        ));
        self.halted = true;
        self.finish_session(StopReason::IntegrityFault);
    }

    fn emit_diagnostic(&self, diagnostic: DiagnosticEvent) {
        self.events.emit(EngineEvent::Diagnostic(diagnostic));
    }

    fn publish(&self, session: Option<Session>) {
        let status = session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle);
        self.state.send_replace(EngineState {
            status,
            session,
            halted: self.halted,
        });
    }
}
