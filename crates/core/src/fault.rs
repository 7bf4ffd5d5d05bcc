//! Per-sensor fault bookkeeping, owned by the sampling scheduler

use chrono::{DateTime, Local};
use std::time::Duration;
use templog_types::SensorStatus;

/// Outcome of recording a tick for one sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTransition {
    None,
    /// First success after one or more failed ticks
    Recovered { after_failed_ticks: u32 },
    /// Failed ticks reached the limit; the sensor leaves the rotation
    Disabled,
}

/// Consecutive-failure counter and last-success timestamps for one sensor
#[derive(Debug, Clone, Default)]
pub struct SensorFaultState {
    pub consecutive_failed_ticks: u32,
    /// Failed attempts across the session, including recovered ones
    pub failed_attempts: u64,
    /// Monotonic offset of the last successful read
    pub last_success: Option<Duration>,
    pub last_success_at: Option<DateTime<Local>>,
    pub status: SensorStatus,
}

impl SensorFaultState {
    pub fn new(status: SensorStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.status == SensorStatus::Disabled
    }

    pub fn record_success(
        &mut self,
        failed_attempts: usize,
        monotonic: Duration,
        at: DateTime<Local>,
    ) -> FaultTransition {
        self.failed_attempts += failed_attempts as u64;
        self.last_success = Some(monotonic);
        self.last_success_at = Some(at);

        let previous = std::mem::take(&mut self.consecutive_failed_ticks);
        if previous > 0 {
            FaultTransition::Recovered {
                after_failed_ticks: previous,
            }
        } else {
            FaultTransition::None
        }
    }

    pub fn record_failed_tick(&mut self, failed_attempts: usize, disable_after: u32) -> FaultTransition {
        self.failed_attempts += failed_attempts as u64;
        self.consecutive_failed_ticks += 1;

        if disable_after > 0 && self.consecutive_failed_ticks >= disable_after && !self.is_disabled() {
            self.status = SensorStatus::Disabled;
            FaultTransition::Disabled
        } else {
            FaultTransition::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_after_consecutive_failures() {
        let mut state = SensorFaultState::new(SensorStatus::Active);
        assert_eq!(state.record_failed_tick(5, 3), FaultTransition::None);
        assert_eq!(state.record_failed_tick(5, 3), FaultTransition::None);
        assert_eq!(state.record_failed_tick(5, 3), FaultTransition::Disabled);
        assert!(state.is_disabled());
        assert_eq!(state.failed_attempts, 15);
    }

    #[test]
    fn test_success_resets_counter() {
        let mut state = SensorFaultState::new(SensorStatus::Active);
        state.record_failed_tick(5, 3);
        state.record_failed_tick(5, 3);
        assert_eq!(
            state.record_success(1, Duration::from_secs(3), Local::now()),
            FaultTransition::Recovered {
                after_failed_ticks: 2
            }
        );
        assert_eq!(state.consecutive_failed_ticks, 0);
        assert_eq!(state.record_failed_tick(5, 3), FaultTransition::None);
        assert!(!state.is_disabled());
    }

    #[test]
    fn test_zero_limit_never_disables() {
        let mut state = SensorFaultState::new(SensorStatus::Active);
        for _ in 0..100 {
            assert_eq!(state.record_failed_tick(1, 0), FaultTransition::None);
        }
    }
}
