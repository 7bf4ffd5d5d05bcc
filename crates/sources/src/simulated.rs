//! Simulated thermometers for bench testing without hardware
//!
//! Provides a configurable temperature with a constant value or an
//! oscillating waveform, optional noise, injected faults and read latency.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use templog_core::{SensorFault, SensorHandle, SensorMetadata};
use templog_types::SensorFaultKind;

/// Waveform of a simulated sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaveMode {
    /// Fixed value
    #[default]
    Constant,
    SineWave,
    /// Linear ramp from min to max, then jump back
    Sawtooth,
    Triangle,
    Square,
}

/// Configuration of one simulated sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedConfig {
    pub id: String,
    #[serde(default)]
    pub mode: WaveMode,
    /// Value in `Constant` mode
    #[serde(default = "default_value")]
    pub value: f64,
    #[serde(default = "default_min")]
    pub min_celsius: f64,
    #[serde(default = "default_max")]
    pub max_celsius: f64,
    /// Wave period in seconds
    #[serde(default = "default_period")]
    pub period_secs: f64,
    /// Peak amplitude of uniform noise in °C
    #[serde(default)]
    pub noise: f64,
    /// Probability in [0, 1] that an attempt fails
    #[serde(default)]
    pub fault_rate: f64,
    /// Time each read takes, like a DS18B20 conversion
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_value() -> f64 {
    21.0
}

fn default_min() -> f64 {
    18.0
}

fn default_max() -> f64 {
    32.0
}

fn default_period() -> f64 {
    600.0
}

impl SimulatedConfig {
    pub fn constant(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            mode: WaveMode::Constant,
            value,
            min_celsius: default_min(),
            max_celsius: default_max(),
            period_secs: default_period(),
            noise: 0.0,
            fault_rate: 0.0,
            latency_ms: 0,
        }
    }
}

pub struct SimulatedSensor {
    metadata: SensorMetadata,
    config: Mutex<SimulatedConfig>,
    start_time: Instant,
}

impl SimulatedSensor {
    pub fn new(config: SimulatedConfig) -> Self {
        let description = format!("Simulated {:?} thermometer", config.mode);
        Self {
            metadata: SensorMetadata::new(config.id.clone(), "simulated", description),
            config: Mutex::new(config),
            start_time: Instant::now(),
        }
    }

    /// Change the waveform of a running sensor
    pub fn reconfigure(&self, update: impl FnOnce(&mut SimulatedConfig)) {
        let mut config = self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut config);
    }

    fn config(&self) -> SimulatedConfig {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Value of the waveform `elapsed` after start, without noise
fn wave_value(config: &SimulatedConfig, elapsed: Duration) -> f64 {
    let range = config.max_celsius - config.min_celsius;
    let period = if config.period_secs > 0.0 {
        config.period_secs
    } else {
        1.0
    };
    let cycles = elapsed.as_secs_f64() / period;

    match config.mode {
        WaveMode::Constant => config.value,
        WaveMode::SineWave => {
            let normalized = ((cycles * std::f64::consts::TAU).sin() + 1.0) / 2.0;
            config.min_celsius + normalized * range
        }
        WaveMode::Sawtooth => config.min_celsius + cycles.fract() * range,
        WaveMode::Triangle => {
            let phase = cycles.fract() * 2.0;
            let normalized = if phase <= 1.0 { phase } else { 2.0 - phase };
            config.min_celsius + normalized * range
        }
        WaveMode::Square => {
            if cycles.fract() < 0.5 {
                config.max_celsius
            } else {
                config.min_celsius
            }
        }
    }
}

impl SensorHandle for SimulatedSensor {
    fn metadata(&self) -> &SensorMetadata {
        &self.metadata
    }

    fn read(&self) -> Result<f64, SensorFault> {
        let config = self.config();
        if config.latency_ms > 0 {
            std::thread::sleep(Duration::from_millis(config.latency_ms));
        }

        let mut rng = rand::thread_rng();
        if config.fault_rate > 0.0 && rng.gen_bool(config.fault_rate.clamp(0.0, 1.0)) {
            return Err(SensorFault::new(SensorFaultKind::IoError, "injected fault"));
        }

        let mut value = wave_value(&config, self.start_time.elapsed());
        if config.noise > 0.0 {
            value += rng.gen_range(-config.noise..=config.noise);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(mode: WaveMode) -> SimulatedConfig {
        SimulatedConfig {
            mode,
            min_celsius: 10.0,
            max_celsius: 30.0,
            period_secs: 100.0,
            ..SimulatedConfig::constant("sim-1", 20.0)
        }
    }

    #[test]
    fn test_waveforms() {
        let quarter = Duration::from_secs(25);
        assert_eq!(wave_value(&wave(WaveMode::Constant), quarter), 20.0);
        assert!((wave_value(&wave(WaveMode::SineWave), quarter) - 30.0).abs() < 1e-9);
        assert!((wave_value(&wave(WaveMode::Sawtooth), quarter) - 15.0).abs() < 1e-9);
        assert!((wave_value(&wave(WaveMode::Triangle), Duration::from_secs(75)) - 15.0).abs() < 1e-9);
        assert_eq!(wave_value(&wave(WaveMode::Square), quarter), 30.0);
        assert_eq!(wave_value(&wave(WaveMode::Square), Duration::from_secs(60)), 10.0);
    }

    #[test]
    fn test_noise_stays_within_amplitude() {
        let sensor = SimulatedSensor::new(SimulatedConfig {
            noise: 0.25,
            ..SimulatedConfig::constant("sim-1", 20.0)
        });
        for _ in 0..100 {
            let value = sensor.read().unwrap();
            assert!((19.75..=20.25).contains(&value));
        }
    }

    #[test]
    fn test_fault_injection() {
        let sensor = SimulatedSensor::new(SimulatedConfig {
            fault_rate: 1.0,
            ..SimulatedConfig::constant("sim-1", 20.0)
        });
        assert_eq!(sensor.read().unwrap_err().kind, SensorFaultKind::IoError);

        sensor.reconfigure(|config| config.fault_rate = 0.0);
        assert_eq!(sensor.read().unwrap(), 20.0);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: SimulatedConfig = serde_json::from_str(r#"{"id": "sim-9"}"#).unwrap();
        assert_eq!(config.mode, WaveMode::Constant);
        assert_eq!(config.value, 21.0);
        assert_eq!(config.fault_rate, 0.0);
    }
}
