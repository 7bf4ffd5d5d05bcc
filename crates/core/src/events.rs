//! Event stream from the engine to its consumers
//!
//! Events travel over a bounded crossbeam channel. The engine never waits on
//! a slow consumer: when the channel is full the event is dropped and
//! counted. Every event is also written to the log.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use templog_types::{EngineEvent, SessionStatus};

pub type EventReceiver = Receiver<EngineEvent>;

/// Create a bounded event channel
pub fn event_channel(capacity: usize) -> (EventSink, EventReceiver) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    (EventSink::new(tx), rx)
}

pub struct EventSink {
    tx: Sender<EngineEvent>,
    dropped: AtomicU64,
}

impl EventSink {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Events lost because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn emit(&self, event: EngineEvent) {
        log_event(&event);

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Event consumer is behind, dropped event ({} total)", dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Event consumer disconnected");
            }
        }
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Tick(tick) => trace!(
            "{} tick {} closed with {} readings",
            tick.kind.tag(),
            tick.tick,
            tick.readings.len()
        ),
        EngineEvent::Diagnostic(diag) => match &diag.sensor_id {
            Some(sensor) => warn!("[{}] {}", sensor, diag.message),
            None => warn!("{}", diag.message),
        },
        EngineEvent::SessionState(state) => match (&state.status, &state.reason) {
            (SessionStatus::Stopped, Some(reason)) => {
                info!("Session {} stopped: {}", state.session_id, reason)
            }
            (status, _) => info!("Session {} is now {}", state.session_id, status),
        },
        EngineEvent::Summary(summary) => info!(
            "Session {} summary: {} readings, {} faults",
            summary.session_id, summary.total_readings, summary.total_faults
        ),
    }
}
