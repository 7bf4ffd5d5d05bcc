//! 1-Wire sensors (DS18B20 family) read through the kernel's w1 sysfs tree
//!
//! Each device directory contains a `w1_slave` file. Reading it triggers a
//! conversion (~750ms at 12-bit resolution) and returns two lines:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use templog_core::{SensorFault, SensorHandle, SensorMetadata};
use templog_types::SensorFaultKind;

/// Where the kernel exposes 1-Wire devices
pub const DEFAULT_W1_ROOT: &str = "/sys/bus/w1/devices";

/// Family codes of temperature sensors understood by the w1_therm driver
const THERM_FAMILIES: &[&str] = &["10-", "22-", "28-", "3b-", "42-"];

/// 12-bit conversion time plus bus transfer
const READ_TIME: Duration = Duration::from_millis(1000);

/// Value a DS18B20 reports before its first conversion
const POWER_ON_RESET_MILLIS: i64 = 85_000;

pub struct W1Sensor {
    metadata: SensorMetadata,
    path: PathBuf,
}

impl W1Sensor {
    pub fn new(device_dir: &Path) -> Option<Self> {
        let address = device_dir.file_name()?.to_str()?.to_string();
        let description = format!("1-Wire thermometer at {}", device_dir.display());
        Some(Self {
            metadata: SensorMetadata::new(address, "w1", description).with_min_read_time(READ_TIME),
            path: device_dir.join("w1_slave"),
        })
    }
}

impl SensorHandle for W1Sensor {
    fn metadata(&self) -> &SensorMetadata {
        &self.metadata
    }

    fn read(&self) -> Result<f64, SensorFault> {
        let content = fs::read_to_string(&self.path)?;
        parse_w1_slave(&content)
    }
}

/// Parse the contents of a `w1_slave` file into °C
pub fn parse_w1_slave(content: &str) -> Result<f64, SensorFault> {
    let mut lines = content.lines();
    let status = lines
        .next()
        .ok_or_else(|| SensorFault::io("empty w1_slave"))?;
    if !status.trim_end().ends_with("YES") {
        return Err(SensorFault::io("CRC check failed"));
    }

    let data = lines
        .next()
        .ok_or_else(|| SensorFault::io("missing temperature line"))?;
    let raw = data
        .rsplit_once("t=")
        .map(|(_, raw)| raw.trim())
        .ok_or_else(|| SensorFault::io("missing t= field"))?;
    let millis: i64 = raw
        .parse()
        .map_err(|_| SensorFault::io(format!("unparseable temperature '{}'", raw)))?;

    if millis == POWER_ON_RESET_MILLIS {
        return Err(SensorFault::new(
            SensorFaultKind::OutOfRange,
            "power-on reset value, conversion not done",
        ));
    }
    Ok(millis as f64 / 1000.0)
}

/// Find all 1-Wire thermometers under `root`, ordered by address
///
/// A missing root is not an error: the w1 bus module is simply not loaded.
pub fn discover(root: &Path) -> io::Result<Vec<W1Sensor>> {
    if !root.exists() {
        debug!("No 1-Wire bus at {}", root.display());
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| THERM_FAMILIES.iter().any(|family| name.starts_with(family)))
                .unwrap_or(false)
        })
        .collect();
    dirs.sort();

    let sensors: Vec<W1Sensor> = dirs.iter().filter_map(|dir| W1Sensor::new(dir)).collect();
    info!("Found {} 1-Wire thermometers under {}", sensors.len(), root.display());
    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    fn device(root: &Path, address: &str, content: &str) {
        let dir = root.join(address);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("w1_slave"), content).unwrap();
    }

    #[test]
    fn test_parse_valid_reading() {
        assert_eq!(parse_w1_slave(GOOD).unwrap(), 23.125);
        let negative = "ff ff : crc=aa YES\nff ff t=-10250\n";
        assert_eq!(parse_w1_slave(negative).unwrap(), -10.25);
    }

    #[test]
    fn test_parse_rejects_bad_crc_and_reset_value() {
        let bad_crc = "72 01 : crc=57 NO\n72 01 t=23125\n";
        assert_eq!(parse_w1_slave(bad_crc).unwrap_err().kind, SensorFaultKind::IoError);

        let reset = "50 05 : crc=1c YES\n50 05 t=85000\n";
        assert_eq!(parse_w1_slave(reset).unwrap_err().kind, SensorFaultKind::OutOfRange);

        assert!(parse_w1_slave("").is_err());
        assert!(parse_w1_slave("x YES\nno field\n").is_err());
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        device(root.path(), "28-0316a2795bff", GOOD);
        device(root.path(), "28-0316a2795aff", GOOD);
        fs::create_dir_all(root.path().join("w1_bus_master1")).unwrap();

        let sensors = discover(root.path()).unwrap();
        let ids: Vec<&str> = sensors.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["28-0316a2795aff", "28-0316a2795bff"]);
        assert_eq!(sensors[0].read().unwrap(), 23.125);
        assert_eq!(sensors[0].metadata().min_read_time, READ_TIME);
    }

    #[test]
    fn test_missing_root_yields_no_sensors() {
        let root = tempfile::tempdir().unwrap();
        assert!(discover(&root.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_unplugged_device_is_io_fault() {
        let root = tempfile::tempdir().unwrap();
        device(root.path(), "28-aa", GOOD);
        let sensors = discover(root.path()).unwrap();
        fs::remove_dir_all(root.path().join("28-aa")).unwrap();

        assert_eq!(sensors[0].read().unwrap_err().kind, SensorFaultKind::IoError);
    }
}
