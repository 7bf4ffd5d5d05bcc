//! Session buffer - the only data shared between sampling and consumers
//!
//! The scheduler is the single writer. Each log tick is appended as one
//! immutable segment (`Arc<[Reading]>`), so a snapshot is a copy of segment
//! pointers taken under a short read lock and can never observe half a tick.
//! A separate bounded window keeps the most recent readings for display.

use crate::error::SessionIntegrityError;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use templog_types::{Reading, SensorId, SessionId};

/// Point-in-time view of a session's logged readings
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    /// True once the session has stopped; the content is then final
    pub sealed: bool,
    segments: Vec<Arc<[Reading]>>,
    len: usize,
}

impl SessionSnapshot {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Readings in append order
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.segments.iter().flat_map(|segment| segment.iter())
    }

    /// Readings grouped by tick, in tick order
    pub fn ticks(&self) -> impl Iterator<Item = &[Reading]> {
        self.segments.iter().map(|segment| &segment[..])
    }

    pub fn to_vec(&self) -> Vec<Reading> {
        self.iter().cloned().collect()
    }
}

struct BufferInner {
    session_id: Option<SessionId>,
    segments: Vec<Arc<[Reading]>>,
    len: usize,
    window: VecDeque<Reading>,
    window_capacity: usize,
    /// Last accepted tick per sensor, for the ordering invariant
    last_tick: HashMap<SensorId, u64>,
    sealed: bool,
    /// Leading readings already persisted by an export
    exported_len: usize,
}

/// Thread-safe store of the active session's readings
pub struct SessionBuffer {
    inner: RwLock<BufferInner>,
}

impl SessionBuffer {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(BufferInner {
                session_id: None,
                segments: Vec::new(),
                len: 0,
                window: VecDeque::with_capacity(window_capacity.min(4096)),
                window_capacity,
                last_tick: HashMap::new(),
                sealed: false,
                exported_len: 0,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferInner> {
        // Recover from poisoned lock - the data is append-only and stays valid
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Session buffer lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferInner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Session buffer lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Clear the buffer for a new session
    ///
    /// Returns the number of logged readings of the previous session that
    /// were never marked exported and have now been dropped.
    pub fn begin_session(&self, session_id: SessionId) -> usize {
        let mut inner = self.write();
        let discarded = inner.len - inner.exported_len;

        inner.session_id = Some(session_id);
        inner.segments.clear();
        inner.len = 0;
        inner.window.clear();
        inner.last_tick.clear();
        inner.sealed = false;
        inner.exported_len = 0;

        discarded
    }

    /// Append one reading as its own segment
    pub fn append(&self, reading: Reading) -> Result<(), SessionIntegrityError> {
        self.append_tick(vec![reading])
    }

    /// Append all readings of one closed tick atomically
    pub fn append_tick(&self, readings: Vec<Reading>) -> Result<(), SessionIntegrityError> {
        if readings.is_empty() {
            return Ok(());
        }

        let mut inner = self.write();
        if inner.session_id.is_none() {
            return Err(SessionIntegrityError::NoSession);
        }
        if inner.sealed {
            return Err(SessionIntegrityError::Sealed);
        }

        // Validate the whole tick before touching anything
        for reading in &readings {
            if let Some(&last_tick) = inner.last_tick.get(&reading.sensor_id) {
                if reading.tick <= last_tick {
                    return Err(SessionIntegrityError::OutOfOrder {
                        sensor: reading.sensor_id.clone(),
                        tick: reading.tick,
                        last_tick,
                    });
                }
            }
        }
        for reading in &readings {
            inner.last_tick.insert(reading.sensor_id.clone(), reading.tick);
        }

        let capacity = inner.window_capacity;
        for reading in &readings {
            if capacity == 0 {
                break;
            }
            if inner.window.len() >= capacity {
                inner.window.pop_front();
            }
            inner.window.push_back(reading.clone());
        }

        inner.len += readings.len();
        inner.segments.push(Arc::from(readings));
        Ok(())
    }

    /// Mark the session finished; later appends are integrity errors
    pub fn seal(&self) {
        let mut inner = self.write();
        inner.sealed = true;
        debug!("Session buffer sealed with {} readings", inner.len);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.read();
        SessionSnapshot {
            session_id: inner.session_id.clone(),
            sealed: inner.sealed,
            segments: inner.segments.clone(),
            len: inner.len,
        }
    }

    /// The most recent `n` readings (at most the window capacity), oldest first
    pub fn recent_window(&self, n: usize) -> Vec<Reading> {
        let inner = self.read();
        let skip = inner.window.len().saturating_sub(n);
        inner.window.iter().skip(skip).cloned().collect()
    }

    pub fn set_window_capacity(&self, capacity: usize) {
        let mut inner = self.write();
        inner.window_capacity = capacity;
        while inner.window.len() > capacity {
            inner.window.pop_front();
        }
    }

    /// Record that every reading covered by `snapshot` has been persisted
    ///
    /// Readings appended after the snapshot was taken stay unexported. A
    /// snapshot of an earlier session is ignored.
    pub fn mark_exported(&self, snapshot: &SessionSnapshot) {
        let mut inner = self.write();
        if snapshot.session_id.is_none() || snapshot.session_id != inner.session_id {
            debug!("Ignoring export mark for a session that is no longer buffered");
            return;
        }
        inner.exported_len = inner.exported_len.max(snapshot.len.min(inner.len));
    }

    /// Logged readings that would be lost if a new session started now
    pub fn unexported_len(&self) -> usize {
        let inner = self.read();
        inner.len - inner.exported_len
    }

    pub fn len(&self) -> usize {
        self.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
