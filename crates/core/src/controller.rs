//! Threshold controller - decides whether a running session continues
//!
//! Evaluated once per closed tick, in this order:
//! 1. the session's duration limit has elapsed -> stop
//! 2. an armed stop condition is satisfied by a tracked sensor -> stop
//! 3. otherwise continue
//!
//! A stop condition that fires is disarmed for the sensor that tripped it
//! and only re-arms once that sensor reads at least `hysteresis` degrees on
//! the safe side of the bound. The armed state outlives the session, so a
//! new session started right at the boundary cannot stop again immediately.

use crate::error::StartRejected;
use log::{debug, info};
use std::collections::BTreeSet;
use std::time::Duration;
use templog_types::{Bound, Reading, SensorId, StopReason, ThresholdConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Default)]
pub struct ThresholdController {
    thresholds: ThresholdConfig,
    duration_limit: Option<Duration>,
    /// Stop bound the disarmed set refers to
    armed_for: Option<Bound>,
    disarmed: BTreeSet<SensorId>,
    running: bool,
}

impl ThresholdController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate a Start against one fresh reading of each active sensor
    pub fn check_start(
        thresholds: &ThresholdConfig,
        readings: &[Reading],
    ) -> Result<(), StartRejected> {
        let Some(start) = thresholds.start else {
            return Ok(());
        };

        let satisfied = readings
            .iter()
            .filter(|r| thresholds.is_tracked(&r.sensor_id))
            .filter_map(|r| r.celsius())
            .any(|celsius| start.is_satisfied(celsius));

        if satisfied {
            Ok(())
        } else {
            Err(StartRejected::StartConditionNotMet)
        }
    }

    pub fn begin_session(&mut self, thresholds: ThresholdConfig, duration_limit: Option<Duration>) {
        if thresholds.stop != self.armed_for {
            // A different stop condition starts out armed everywhere
            self.disarmed.clear();
            self.armed_for = thresholds.stop;
        }
        self.thresholds = thresholds;
        self.duration_limit = duration_limit;
        self.running = true;
    }

    pub fn end_session(&mut self) {
        self.running = false;
    }

    pub fn is_armed(&self, sensor: &SensorId) -> bool {
        !self.disarmed.contains(sensor)
    }

    /// Re-arm sensors whose readings cleared the hysteresis band
    pub fn observe(&mut self, readings: &[Reading]) {
        let Some(stop) = self.armed_for else {
            return;
        };
        if self.disarmed.is_empty() {
            return;
        }

        let hysteresis = self.thresholds.hysteresis;
        for reading in readings {
            if let Some(celsius) = reading.celsius() {
                if stop.is_cleared(celsius, hysteresis) && self.disarmed.remove(&reading.sensor_id) {
                    debug!(
                        "Stop condition {} re-armed for {} at {:.2}°C",
                        stop, reading.sensor_id, celsius
                    );
                }
            }
        }
    }

    /// Evaluate one complete tick taken `elapsed` after session start
    pub fn evaluate(&mut self, elapsed: Duration, readings: &[Reading]) -> Decision {
        if !self.running {
            return Decision::Continue;
        }
        self.observe(readings);

        if let Some(limit) = self.duration_limit {
            if elapsed >= limit {
                info!("Duration limit {:?} reached after {:?}", limit, elapsed);
                return Decision::Stop(StopReason::DurationExpired);
            }
        }

        let Some(stop) = self.thresholds.stop else {
            return Decision::Continue;
        };

        let mut triggered: Option<(SensorId, f64)> = None;
        for reading in readings {
            if !self.thresholds.is_tracked(&reading.sensor_id) {
                continue;
            }
            let Some(celsius) = reading.celsius() else {
                continue;
            };
            if stop.is_satisfied(celsius) && self.is_armed(&reading.sensor_id) {
                self.disarmed.insert(reading.sensor_id.clone());
                if triggered.is_none() {
                    triggered = Some((reading.sensor_id.clone(), celsius));
                }
            }
        }

        match triggered {
            Some((sensor_id, celsius)) => {
                info!("Stop condition {} met by {} at {:.2}°C", stop, sensor_id, celsius);
                Decision::Stop(StopReason::Threshold {
                    sensor_id,
                    celsius,
                    bound: stop,
                })
            }
            None => Decision::Continue,
        }
    }
}
