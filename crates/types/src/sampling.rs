//! Sampling, retry and retention configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_log_interval() -> u64 {
    10_000 // 10 seconds
}

fn default_display_interval() -> Option<u64> {
    Some(3_000)
}

fn default_display_window() -> usize {
    500
}

/// Cadences of the sampling loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_log_interval")]
    pub log_interval_ms: u64,
    /// Faster view cadence; `None` forwards log ticks to the display instead
    #[serde(default = "default_display_interval")]
    pub display_interval_ms: Option<u64>,
    /// Readings kept in memory for live display
    #[serde(default = "default_display_window")]
    pub display_window: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            log_interval_ms: default_log_interval(),
            display_interval_ms: default_display_interval(),
            display_window: default_display_window(),
        }
    }
}

impl SamplingConfig {
    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms.max(1))
    }

    pub fn display_interval(&self) -> Option<Duration> {
        self.display_interval_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    800
}

fn default_disable_after_ticks() -> u32 {
    5
}

/// Floor for a derived read timeout
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Per-tick retry policy for unreliable sensor reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Read attempts per sensor per tick, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per further attempt
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Deadline for a single attempt; derived from the interval when unset
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    /// Consecutive failed ticks before a sensor is disabled
    #[serde(default = "default_disable_after_ticks")]
    pub disable_after_ticks: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            read_timeout_ms: None,
            disable_after_ticks: default_disable_after_ticks(),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Deadline for one attempt when logging every `interval` from a sensor
    /// that needs at least `min_read_time` per conversion
    ///
    /// Unless configured explicitly, all attempts of a tick fit in half the
    /// interval, but an attempt never gets less than one conversion.
    pub fn read_timeout(&self, interval: Duration, min_read_time: Duration) -> Duration {
        match self.read_timeout_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => (interval / (2 * self.max_attempts()))
                .max(MIN_READ_TIMEOUT)
                .max(min_read_time),
        }
    }
}

/// What happens to unexported readings when a new session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnexportedDataPolicy {
    /// Drop them, reporting how many were lost
    #[default]
    Discard,
    /// Refuse the new session until they are exported
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub on_new_session: UnexportedDataPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_after(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_after(10), Duration::from_millis(800));
    }

    #[test]
    fn test_read_timeout_derived_from_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.read_timeout(Duration::from_secs(10), Duration::ZERO),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.read_timeout(Duration::from_millis(100), Duration::ZERO),
            MIN_READ_TIMEOUT
        );
        // A slow conversion is never cut short by a short interval
        assert_eq!(
            policy.read_timeout(Duration::from_secs(3), Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );

        let explicit = RetryPolicy {
            read_timeout_ms: Some(750),
            ..RetryPolicy::default()
        };
        assert_eq!(
            explicit.read_timeout(Duration::from_secs(10), Duration::from_secs(2)),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_sampling_defaults_from_empty_json() {
        let config: SamplingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.log_interval(), Duration::from_secs(10));
        assert_eq!(config.display_interval(), Some(Duration::from_secs(3)));
        assert_eq!(config.display_window, 500);
    }
}
