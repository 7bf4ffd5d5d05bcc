//! Shared sysinfo components cache
//!
//! Component discovery is slow, so one global `Components` list is built on
//! first use and shared by every system sensor. Refreshes are throttled so
//! that a tick reading several system sensors polls the hardware once.

use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use sysinfo::Components;

/// Minimum interval between refreshes
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

struct SharedComponents {
    components: Components,
    last_refresh: Instant,
}

impl SharedComponents {
    fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
            last_refresh: Instant::now(),
        }
    }

    fn refresh_if_needed(&mut self) {
        if self.last_refresh.elapsed() >= MIN_REFRESH_INTERVAL {
            self.components.refresh();
            self.last_refresh = Instant::now();
        }
    }
}

static SHARED_COMPONENTS: Lazy<Mutex<SharedComponents>> = Lazy::new(|| {
    let shared = SharedComponents::new();
    log::info!("System thermal components initialized: {}", shared.components.len());
    Mutex::new(shared)
});

fn lock() -> MutexGuard<'static, SharedComponents> {
    // Recover from poisoned mutex - the component list stays usable
    SHARED_COMPONENTS.lock().unwrap_or_else(|poisoned| {
        log::warn!("Shared components mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Force discovery now instead of on the first read
pub fn initialize() {
    let _ = &*SHARED_COMPONENTS;
}

/// Labels of all thermal components, in discovery order
pub fn labels() -> Vec<String> {
    lock()
        .components
        .iter()
        .map(|c| c.label().to_string())
        .collect()
}

/// Current temperature of the component with `label`
pub fn temperature_by_label(label: &str) -> Option<f32> {
    let mut shared = lock();
    shared.refresh_if_needed();
    shared
        .components
        .iter()
        .find(|c| c.label() == label)
        .map(|c| c.temperature())
}
