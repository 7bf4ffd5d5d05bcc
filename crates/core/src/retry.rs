//! Per-tick bounded retry for sensor reads
//!
//! Each sensor gets its own `TickRetry` per tick, so a slow or failing
//! sensor only ever delays its own result. Every attempt runs on the
//! blocking pool under a deadline enforced here, not by the driver.

use crate::error::SensorFault;
use crate::sensor::SharedSensor;
use log::{debug, trace};
use std::sync::Arc;
use std::time::Duration;
use templog_types::{RetryPolicy, SensorId};

/// Next step after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait `backoff`, then make attempt number `attempt`
    Retry { attempt: u32, backoff: Duration },
    /// No attempts left this tick
    Exhausted,
}

/// Attempt counter for one sensor within one tick
#[derive(Debug, Clone)]
pub struct TickRetry {
    policy: RetryPolicy,
    attempts: u32,
}

impl TickRetry {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
            attempts: 0,
        }
    }

    /// Count a new attempt and return its number (1-based)
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Decide what to do after the current attempt failed
    pub fn record_fault(&mut self) -> RetryStep {
        if self.attempts >= self.policy.max_attempts() {
            RetryStep::Exhausted
        } else {
            RetryStep::Retry {
                attempt: self.attempts + 1,
                backoff: self.policy.backoff_after(self.attempts),
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Result of all attempts for one sensor in one tick
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub sensor_id: SensorId,
    /// The value, or the last fault once attempts ran out
    pub result: Result<f64, SensorFault>,
    pub attempts: u32,
    /// Every failed attempt, in order
    pub faults: Vec<SensorFault>,
}

/// Read `sensor`, retrying with backoff until it answers or attempts run out
pub async fn read_with_retry(
    sensor: SharedSensor,
    policy: &RetryPolicy,
    timeout: Duration,
) -> ReadOutcome {
    let sensor_id = sensor.id().clone();
    let mut retry = TickRetry::new(policy);
    let mut faults = Vec::new();

    loop {
        let attempt = retry.begin_attempt();
        match read_once(&sensor, timeout).await {
            Ok(celsius) => {
                trace!("{}: {:.3}°C on attempt {}", sensor_id, celsius, attempt);
                return ReadOutcome {
                    sensor_id,
                    result: Ok(celsius),
                    attempts: attempt,
                    faults,
                };
            }
            Err(fault) => {
                debug!("{}: attempt {} failed: {}", sensor_id, attempt, fault);
                faults.push(fault.clone());
                match retry.record_fault() {
                    RetryStep::Retry { backoff, .. } => tokio::time::sleep(backoff).await,
                    RetryStep::Exhausted => {
                        return ReadOutcome {
                            sensor_id,
                            result: Err(fault),
                            attempts: attempt,
                            faults,
                        };
                    }
                }
            }
        }
    }
}

/// One attempt on the blocking pool. On timeout the blocking call is
/// abandoned, not cancelled; its late result is dropped.
async fn read_once(sensor: &SharedSensor, timeout: Duration) -> Result<f64, SensorFault> {
    let handle = Arc::clone(sensor);
    let task = tokio::task::spawn_blocking(move || handle.read().and_then(|v| handle.validate(v)));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(SensorFault::io(format!("read task failed: {}", join_err))),
        Err(_) => Err(SensorFault::timeout(timeout)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted sensor shared by the engine's tests

    use crate::error::SensorFault;
    use crate::sensor::{SensorHandle, SensorMetadata};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub struct ScriptedSensor {
        metadata: SensorMetadata,
        script: Mutex<VecDeque<Result<f64, SensorFault>>>,
        fallback: Mutex<Result<f64, SensorFault>>,
        delay: Option<Duration>,
        reads: AtomicUsize,
    }

    impl ScriptedSensor {
        pub fn constant(id: &str, celsius: f64) -> Self {
            Self {
                metadata: SensorMetadata::new(id, "scripted", "scripted test sensor"),
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(Ok(celsius)),
                delay: None,
                reads: AtomicUsize::new(0),
            }
        }

        pub fn failing(id: &str) -> Self {
            let sensor = Self::constant(id, 0.0);
            *sensor.fallback.lock().unwrap() = Err(SensorFault::io("bus error"));
            sensor
        }

        /// Results returned in order before falling back to the constant
        pub fn with_script(self, script: Vec<Result<f64, SensorFault>>) -> Self {
            *self.script.lock().unwrap() = script.into();
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn with_min_read_time(mut self, min_read_time: Duration) -> Self {
            self.metadata = self.metadata.with_min_read_time(min_read_time);
            self
        }

        pub fn set_fallback(&self, result: Result<f64, SensorFault>) {
            *self.fallback.lock().unwrap() = result;
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub fn shared(self) -> Arc<Self> {
            Arc::new(self)
        }
    }

    impl SensorHandle for ScriptedSensor {
        fn metadata(&self) -> &SensorMetadata {
            &self.metadata
        }

        fn read(&self) -> Result<f64, SensorFault> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            self.fallback.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSensor;
    use super::*;
    use templog_types::SensorFaultKind;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
            read_timeout_ms: None,
            disable_after_ticks: 3,
        }
    }

    #[test]
    fn test_tick_retry_exhausts_after_max_attempts() {
        let mut retry = TickRetry::new(&policy(3));
        assert_eq!(retry.begin_attempt(), 1);
        assert_eq!(
            retry.record_fault(),
            RetryStep::Retry {
                attempt: 2,
                backoff: Duration::from_millis(10)
            }
        );
        retry.begin_attempt();
        assert_eq!(
            retry.record_fault(),
            RetryStep::Retry {
                attempt: 3,
                backoff: Duration::from_millis(20)
            }
        );
        retry.begin_attempt();
        assert_eq!(retry.record_fault(), RetryStep::Exhausted);
        assert_eq!(retry.attempts(), 3);
    }

    #[test]
    fn test_zero_attempts_still_reads_once() {
        let mut retry = TickRetry::new(&policy(0));
        retry.begin_attempt();
        assert_eq!(retry.record_fault(), RetryStep::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_tick() {
        let sensor = ScriptedSensor::constant("28-a", 21.0)
            .with_script(vec![
                Err(SensorFault::io("crc")),
                Err(SensorFault::io("crc")),
            ])
            .shared();

        let outcome = read_with_retry(sensor.clone(), &policy(5), Duration::from_secs(1)).await;
        assert_eq!(outcome.result, Ok(21.0));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.faults.len(), 2);
        assert_eq!(sensor.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_fault() {
        let sensor = ScriptedSensor::failing("28-a").shared();

        let outcome = read_with_retry(sensor.clone(), &policy(4), Duration::from_secs(1)).await;
        assert_eq!(outcome.result.map_err(|f| f.kind), Err(SensorFaultKind::IoError));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(sensor.reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_value_is_a_fault() {
        let sensor = ScriptedSensor::constant("28-a", 500.0).shared();

        let outcome = read_with_retry(sensor, &policy(2), Duration::from_secs(1)).await;
        assert_eq!(
            outcome.result.map_err(|f| f.kind),
            Err(SensorFaultKind::OutOfRange)
        );
    }

    #[tokio::test]
    async fn test_caller_enforces_timeout() {
        let sensor = ScriptedSensor::constant("28-a", 21.0)
            .with_delay(Duration::from_millis(300))
            .shared();
        let policy = RetryPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            ..policy(2)
        };

        let started = std::time::Instant::now();
        let outcome = read_with_retry(sensor, &policy, Duration::from_millis(20)).await;
        assert_eq!(outcome.result.map_err(|f| f.kind), Err(SensorFaultKind::Timeout));
        assert_eq!(outcome.attempts, 2);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
