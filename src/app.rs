//! Application wiring: engine task, event router and exports
//!
//! The engine runs on the tokio runtime. Its events are consumed by a
//! dedicated router thread that drives the console and the live session
//! log, so slow terminal or disk output never holds up sampling.

use anyhow::{bail, Context, Result};
use crossbeam::channel::Receiver;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use crate::config::{AppConfig, SessionCounter};
use crate::display::{status_table, ConsoleDisplay};
use crate::export::{ExportCoordinator, ExportError, ExportFormat, SessionLogWriter};
use templog_core::{event_channel, spawn_engine, EngineError, EngineHandle, SensorHandle, SharedSensor};
use templog_types::{
    ConfigUpdate, EngineEvent, SensorId, Session, SessionStatus, StartCommand, TickKind,
};

/// Operator input while a session runs
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Stop,
    Status,
    Rename(SensorId, String),
    Enable(SensorId),
    Disable(SensorId),
    EnableAll,
    DisableAll,
    /// Seconds
    LogInterval(u64),
    /// Seconds; 0 turns the view cadence off
    ViewInterval(u64),
}

impl FromStr for Control {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let mut sensor = || -> Result<SensorId> {
            words
                .next()
                .map(SensorId::new)
                .context("missing sensor id")
        };

        let control = match command.as_str() {
            "stop" | "q" | "quit" => Control::Stop,
            "status" | "s" => Control::Status,
            "enable" | "disable" => {
                let id = sensor()?;
                match (command.as_str(), id.as_str()) {
                    ("enable", "all") => Control::EnableAll,
                    ("disable", "all") => Control::DisableAll,
                    ("enable", _) => Control::Enable(id),
                    _ => Control::Disable(id),
                }
            }
            "rename" => {
                let id = sensor()?;
                let label = line
                    .splitn(3, char::is_whitespace)
                    .nth(2)
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .context("missing label")?;
                Control::Rename(id, label.to_string())
            }
            "log" | "view" => {
                let secs: u64 = line
                    .split_whitespace()
                    .nth(1)
                    .context("missing interval")?
                    .parse()
                    .context("interval must be whole seconds")?;
                if command == "log" {
                    Control::LogInterval(secs)
                } else {
                    Control::ViewInterval(secs)
                }
            }
            "" => bail!("empty command"),
            other => bail!("unknown command '{}'", other),
        };
        Ok(control)
    }
}

/// What a finished session left behind
#[derive(Debug)]
pub struct SessionReport {
    pub session: Session,
    pub exported: Vec<(ExportFormat, Result<PathBuf, ExportError>)>,
}

pub struct App {
    config: AppConfig,
    engine: EngineHandle,
    engine_task: tokio::task::JoinHandle<()>,
    router: Option<JoinHandle<()>>,
    exports: Arc<Mutex<ExportCoordinator>>,
    sensor_ids: Vec<SensorId>,
}

impl App {
    /// Spawn the engine over `sensors`. Must be called inside a tokio runtime.
    pub fn launch(
        config: AppConfig,
        sensors: Vec<SharedSensor>,
        display: ConsoleDisplay,
        counter: SessionCounter,
    ) -> Result<Self> {
        let sensor_ids = sensors.iter().map(|s| s.id().clone()).collect();
        let (sink, events) = event_channel(config.event_capacity);
        let (engine, engine_task) = spawn_engine(sensors, config.engine_config(), sink);
        let exports = Arc::new(Mutex::new(ExportCoordinator::new(
            config.measurement_folder.clone(),
            counter,
        )));

        let router = {
            let engine = engine.clone();
            let exports = Arc::clone(&exports);
            thread::Builder::new()
                .name("event-router".to_string())
                .spawn(move || route_events(events, engine, exports, display))
                .context("Failed to spawn event router thread")?
        };

        Ok(Self {
            config,
            engine,
            engine_task,
            router: Some(router),
            exports,
            sensor_ids,
        })
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Every discovered sensor, in discovery order
    pub fn all_sensor_ids(&self) -> &[SensorId] {
        &self.sensor_ids
    }

    /// Run one session until it stops on its own or is stopped through
    /// `controls`, then write the configured automatic exports
    pub async fn run_session(
        &mut self,
        start: StartCommand,
        controls: &mut mpsc::Receiver<Control>,
    ) -> Result<SessionReport> {
        self.engine.start(start).await?;

        let mut controls_open = true;
        loop {
            tokio::select! {
                state = self.engine.wait_until_stopped() => {
                    state?;
                    break;
                }
                control = controls.recv(), if controls_open => match control {
                    Some(Control::Stop) => {
                        info!("Stop requested");
                        match self.engine.stop().await {
                            Ok(_) | Err(EngineError::NotRunning) => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    Some(control) => {
                        if let Err(e) = self.control(control).await {
                            warn!("{:#}", e);
                        }
                    }
                    None => controls_open = false,
                },
            }
        }

        let session = self
            .engine
            .state()
            .session
            .context("Engine reported no session after stopping")?;
        let formats = self.config.auto_export.clone();
        let exported = self.export(&formats, false);
        for (format, result) in &exported {
            match result {
                Ok(path) => println!("{} saved to {}", format, path.display()),
                Err(e) => error!("{} export failed: {}", format, e),
            }
        }

        Ok(SessionReport { session, exported })
    }

    async fn control(&mut self, control: Control) -> Result<()> {
        let update = match control {
            Control::Stop => {
                self.engine.stop().await?;
                return Ok(());
            }
            Control::Status => {
                println!(
                    "{}",
                    status_table(&self.engine.sensor_statuses(), &self.engine.labels())
                );
                if let Some(progress) = self
                    .engine
                    .state()
                    .session
                    .and_then(|s| s.progress(chrono::Local::now()))
                {
                    println!("{}", progress.describe());
                }
                return Ok(());
            }
            Control::Rename(sensor, label) => {
                self.rename(sensor, &label).await?;
                return Ok(());
            }
            Control::Enable(sensor) => ConfigUpdate {
                enable: vec![sensor],
                ..ConfigUpdate::default()
            },
            Control::Disable(sensor) => ConfigUpdate {
                disable: vec![sensor],
                ..ConfigUpdate::default()
            },
            Control::EnableAll => ConfigUpdate {
                enable: self.sensor_ids.clone(),
                ..ConfigUpdate::default()
            },
            Control::DisableAll => ConfigUpdate {
                disable: self.sensor_ids.clone(),
                ..ConfigUpdate::default()
            },
            Control::LogInterval(secs) => ConfigUpdate {
                log_interval_ms: Some(secs.max(1).saturating_mul(1000)),
                ..ConfigUpdate::default()
            },
            Control::ViewInterval(secs) => ConfigUpdate {
                display_interval_ms: Some((secs > 0).then(|| secs.saturating_mul(1000))),
                ..ConfigUpdate::default()
            },
        };
        self.engine.apply_config(update).await?;
        Ok(())
    }

    /// Give `sensor` a new label and keep it in the configuration
    pub async fn rename(&mut self, sensor: SensorId, label: &str) -> Result<String> {
        if !self.sensor_ids.contains(&sensor) {
            bail!("unknown sensor {}", sensor);
        }
        let label = self
            .config
            .set_label(sensor.clone(), label)
            .context("label is empty after removing invalid characters")?;
        self.engine
            .apply_config(ConfigUpdate::rename(sensor, label.clone()))
            .await?;
        Ok(label)
    }

    /// Export the current or last session in each of `formats`
    ///
    /// The readings covered by the export count as persisted once any data
    /// format was written.
    pub fn export(
        &self,
        formats: &[ExportFormat],
        overwrite: bool,
    ) -> Vec<(ExportFormat, Result<PathBuf, ExportError>)> {
        let view = self.engine.export_view();
        let mut exports = lock(&self.exports);

        let results: Vec<_> = formats
            .iter()
            .map(|format| (*format, exports.export(&view, *format, overwrite)))
            .collect();

        if results
            .iter()
            .any(|(format, result)| format.is_data() && result.is_ok())
        {
            self.engine.mark_exported(&view.readings);
        }
        results
    }

    /// Folder of the current or last session, if one was opened
    pub fn session_folder(&self) -> Option<PathBuf> {
        lock(&self.exports).current().map(|folder| folder.path.clone())
    }

    /// Stop the engine and wait for the router to drain
    pub async fn shutdown(mut self) -> Result<()> {
        match self.engine.shutdown().await {
            Ok(()) | Err(EngineError::Closed) => {}
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = (&mut self.engine_task).await {
            error!("Engine task failed: {}", e);
        }
        // The router also holds a handle; dropping ours lets the channel close
        drop(self.engine);
        if let Some(router) = self.router.take() {
            if router.join().is_err() {
                error!("Event router thread panicked");
            }
        }
        Ok(())
    }
}

fn lock(exports: &Mutex<ExportCoordinator>) -> MutexGuard<'_, ExportCoordinator> {
    exports.lock().unwrap_or_else(|poisoned| {
        warn!("Export coordinator mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn route_events(
    events: Receiver<EngineEvent>,
    engine: EngineHandle,
    exports: Arc<Mutex<ExportCoordinator>>,
    mut display: ConsoleDisplay,
) {
    let mut session_log: Option<SessionLogWriter> = None;

    while let Ok(event) = events.recv() {
        let labels = engine.labels();

        match &event {
            EngineEvent::SessionState(state) if state.status == SessionStatus::Running => {
                let session = engine
                    .state()
                    .session
                    .filter(|session| session.id == state.session_id);
                if let Some(session) = session {
                    if let Err(e) = display.begin_session(&session, &labels) {
                        warn!("Console output failed: {}", e);
                    }
                    session_log = open_session_log(&exports, &session);
                }
            }
            EngineEvent::Tick(tick) if tick.kind == TickKind::Log => {
                if let Some(writer) = session_log.as_mut() {
                    if let Err(e) = writer.write_tick(tick) {
                        error!("Live session log disabled: {:#}", e);
                        session_log = None;
                    }
                }
            }
            EngineEvent::SessionState(state) if state.status == SessionStatus::Stopped => {
                if let Some(writer) = session_log.take() {
                    debug!(
                        "Closed session log {} after {} lines",
                        writer.path().display(),
                        writer.lines()
                    );
                }
            }
            _ => {}
        }

        if let Err(e) = display.handle(&event, &labels) {
            warn!("Console output failed: {}", e);
        }
    }
    debug!("Event router finished");
}

fn open_session_log(
    exports: &Mutex<ExportCoordinator>,
    session: &Session,
) -> Option<SessionLogWriter> {
    let path = match lock(exports).log_path(session) {
        Ok(path) => path,
        Err(e) => {
            error!("No session folder, live log disabled: {}", e);
            return None;
        }
    };
    match SessionLogWriter::create(&path, session.active_sensors.clone()) {
        Ok(writer) => {
            info!("Logging to {}", path.display());
            Some(writer)
        }
        Err(e) => {
            error!("{:#}", e);
            None
        }
    }
}
