//! # Auxiliary Sensors
//!
//! A node can carry one extra sensor next to the meter, read in its own poll
//! phase. On Linux hosts a DS18B20 on the 1-Wire bus shows up in sysfs as
//! `/sys/bus/w1/devices/28-*/temperature`, holding millidegrees Celsius.

use crate::error::MeterError;
use std::path::{Path, PathBuf};

/// Sensor read once per poll cycle.
#[async_trait::async_trait]
pub trait AuxSensor: Send {
    fn name(&self) -> &str;

    /// Temperature in 0.01 °C.
    async fn read_temperature(&mut self) -> Result<i16, MeterError>;
}

/// DS18B20 (or compatible) exposed by the Linux w1 driver.
#[derive(Debug, Clone)]
pub struct W1TemperatureSensor {
    path: PathBuf,
}

impl W1TemperatureSensor {
    /// Use the `temperature` file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        W1TemperatureSensor { path: path.into() }
    }

    /// Pick the first thermometer (family code 28) under a w1 devices directory.
    pub fn discover(devices_dir: &Path) -> Result<Self, MeterError> {
        let entries = std::fs::read_dir(devices_dir)
            .map_err(|e| MeterError::SensorError(format!("{}: {e}", devices_dir.display())))?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("28-"))
            .map(|entry| entry.path().join("temperature"))
            .filter(|path| path.is_file())
            .collect();
        candidates.sort();

        candidates
            .into_iter()
            .next()
            .map(Self::new)
            .ok_or_else(|| {
                MeterError::SensorError(format!(
                    "no 1-Wire thermometer under {}",
                    devices_dir.display()
                ))
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Convert the sysfs millidegree reading to 0.01 °C.
pub fn parse_millidegrees(raw: &str) -> Result<i16, MeterError> {
    let millis: i32 = raw
        .trim()
        .parse()
        .map_err(|e| MeterError::SensorError(format!("bad temperature '{}': {e}", raw.trim())))?;

    i16::try_from(millis / 10)
        .map_err(|_| MeterError::SensorError(format!("temperature out of range: {millis}")))
}

#[async_trait::async_trait]
impl AuxSensor for W1TemperatureSensor {
    fn name(&self) -> &str {
        "1-Wire temperature"
    }

    async fn read_temperature(&mut self) -> Result<i16, MeterError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MeterError::SensorError(format!("{}: {e}", self.path.display())))?;
        parse_millidegrees(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_millidegrees() {
        assert_eq!(parse_millidegrees("21500\n").unwrap(), 2150);
        assert_eq!(parse_millidegrees("-1250").unwrap(), -125);
        assert_eq!(parse_millidegrees("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_millidegrees_errors() {
        assert!(matches!(parse_millidegrees("abc"), Err(MeterError::SensorError(_))));
        assert!(matches!(parse_millidegrees("400000000"), Err(MeterError::SensorError(_))));
    }

    #[tokio::test]
    async fn test_w1_sensor_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("28-000005e2fdc3");
        std::fs::create_dir(&device).unwrap();
        std::fs::write(device.join("temperature"), "23125\n").unwrap();
        std::fs::create_dir(dir.path().join("w1_bus_master1")).unwrap();

        let mut sensor = W1TemperatureSensor::discover(dir.path()).unwrap();
        assert_eq!(sensor.read_temperature().await.unwrap(), 2312);
    }

    #[test]
    fn test_w1_discover_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(W1TemperatureSensor::discover(dir.path()).is_err());
    }
}
