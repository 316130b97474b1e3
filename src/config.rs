//! # Node Configuration
//!
//! The small configuration block a node keeps in non-volatile storage: which
//! meter to poll, how often to report, and the divisors/multipliers that turn
//! raw readings into engineering units.
//!
//! Storage itself sits behind [`ConfigStore`]; [`JsonFileStore`] keeps the
//! block in a JSON file, [`MemoryStore`] in memory.

use crate::constants::{
    ATTRID_CUSTOM_DEVICE_ADDRESS, ATTRID_CUSTOM_MEASUREMENT_PERIOD, DEFAULT_DEVICE_ADDRESS,
    DEFAULT_MEASUREMENT_PERIOD,
};
use crate::error::MeterError;
use crate::mercury::frame::MeterAddress;
use crate::report::AttributeValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device_address: MeterAddress,
    /// Seconds between two poll cycles
    pub measurement_period: u16,
    pub voltage_divisor: u16,
    pub current_divisor: u16,
    pub power_divisor: u16,
    pub voltage_multiplier: u16,
    pub current_multiplier: u16,
    pub power_multiplier: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            device_address: MeterAddress(DEFAULT_DEVICE_ADDRESS),
            measurement_period: DEFAULT_MEASUREMENT_PERIOD,
            voltage_divisor: 10,
            current_divisor: 100,
            power_divisor: 1,
            voltage_multiplier: 1,
            current_multiplier: 1,
            power_multiplier: 1,
        }
    }
}

fn scale(raw: f64, multiplier: u16, divisor: u16) -> f64 {
    raw * f64::from(multiplier) / f64::from(divisor.max(1))
}

impl AppConfig {
    /// Interval of the report timer. Never zero.
    pub fn report_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.measurement_period.max(1)))
    }

    pub fn voltage_volts(&self, raw: u16) -> f64 {
        scale(f64::from(raw), self.voltage_multiplier, self.voltage_divisor)
    }

    pub fn current_amps(&self, raw: u16) -> f64 {
        scale(f64::from(raw), self.current_multiplier, self.current_divisor)
    }

    pub fn power_watts(&self, raw: i16) -> f64 {
        scale(f64::from(raw), self.power_multiplier, self.power_divisor)
    }

    /// Tariff accumulators are in hundredths of a kWh.
    pub fn energy_kwh(raw: u32) -> f64 {
        f64::from(raw) / 100.0
    }

    /// Apply a remote write to one of the writable attributes.
    pub fn write_attribute(&mut self, id: u16, value: AttributeValue) -> Result<(), MeterError> {
        match (id, value) {
            (ATTRID_CUSTOM_DEVICE_ADDRESS, AttributeValue::U32(address)) => {
                self.device_address = MeterAddress(address);
            }
            (ATTRID_CUSTOM_MEASUREMENT_PERIOD, AttributeValue::U16(period)) => {
                self.measurement_period = period;
            }
            (ATTRID_CUSTOM_DEVICE_ADDRESS | ATTRID_CUSTOM_MEASUREMENT_PERIOD, other) => {
                return Err(MeterError::ConfigError(format!(
                    "wrong type {other:?} for attribute 0x{id:04X}"
                )));
            }
            _ => return Err(MeterError::UnknownAttribute(id)),
        }
        Ok(())
    }
}

/// Non-volatile storage for the configuration block.
pub trait ConfigStore: Send {
    /// `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<AppConfig>, MeterError>;

    fn save(&mut self, config: &AppConfig) -> Result<(), MeterError>;
}

/// Load the stored block, or initialise the store with the defaults.
pub fn restore(store: &mut dyn ConfigStore) -> Result<AppConfig, MeterError> {
    match store.load()? {
        Some(config) => {
            log::info!("Restored configuration for meter {}", config.device_address);
            Ok(config)
        }
        None => {
            let config = AppConfig::default();
            store.save(&config)?;
            log::info!("Configuration store was empty, wrote defaults");
            Ok(config)
        }
    }
}

/// The stored block, or the defaults when nothing is stored. Never writes.
pub fn load_or_default(store: &dyn ConfigStore) -> Result<AppConfig, MeterError> {
    Ok(store.load()?.unwrap_or_default())
}

/// Configuration block kept as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<AppConfig>, MeterError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| MeterError::ConfigError(format!("{}: {e}", self.path.display())))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&mut self, config: &AppConfig) -> Result<(), MeterError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MeterError::ConfigError(format!("{}: {e}", parent.display())))?;
        }

        // Write next to the target and rename, so a crash never leaves half a block
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(config)?;
        std::fs::write(&tmp, text)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| MeterError::ConfigError(format!("{}: {e}", self.path.display())))?;

        log::debug!("Saved configuration to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub stored: Option<AppConfig>,
    /// Number of successful saves
    pub saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AppConfig) -> Self {
        MemoryStore {
            stored: Some(config),
            saves: 0,
        }
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<AppConfig>, MeterError> {
        Ok(self.stored.clone())
    }

    fn save(&mut self, config: &AppConfig) -> Result<(), MeterError> {
        self.stored = Some(config.clone());
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.device_address, MeterAddress(11_111_111));
        assert_eq!(config.report_period(), Duration::from_secs(30));
    }

    #[test]
    fn test_scaling() {
        let config = AppConfig::default();
        assert!((config.voltage_volts(2305) - 230.5).abs() < 1e-9);
        assert!((config.current_amps(123) - 1.23).abs() < 1e-9);
        assert!((config.power_watts(-40) + 40.0).abs() < 1e-9);
        assert!((AppConfig::energy_kwh(123_456) - 1234.56).abs() < 1e-9);
    }

    #[test]
    fn test_zero_divisor_and_period() {
        let config = AppConfig {
            voltage_divisor: 0,
            measurement_period: 0,
            ..AppConfig::default()
        };
        assert!((config.voltage_volts(2305) - 2305.0).abs() < 1e-9);
        assert_eq!(config.report_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_write_attribute() {
        let mut config = AppConfig::default();
        config
            .write_attribute(ATTRID_CUSTOM_DEVICE_ADDRESS, AttributeValue::U32(42))
            .unwrap();
        config
            .write_attribute(ATTRID_CUSTOM_MEASUREMENT_PERIOD, AttributeValue::U16(60))
            .unwrap();
        assert_eq!(config.device_address, MeterAddress(42));
        assert_eq!(config.measurement_period, 60);

        assert!(matches!(
            config.write_attribute(ATTRID_CUSTOM_DEVICE_ADDRESS, AttributeValue::U16(1)),
            Err(MeterError::ConfigError(_))
        ));
        assert!(matches!(
            config.write_attribute(0x0505, AttributeValue::U16(1)),
            Err(MeterError::UnknownAttribute(0x0505))
        ));
    }

    #[test]
    fn test_restore_initialises_empty_store() {
        let mut store = MemoryStore::new();
        let config = restore(&mut store).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(store.saves, 1);

        let again = restore(&mut store).unwrap();
        assert_eq!(again, config);
        assert_eq!(store.saves, 1);
    }

    #[test]
    fn test_load_or_default_does_not_save() {
        let store = MemoryStore::new();
        assert_eq!(load_or_default(&store).unwrap(), AppConfig::default());
        assert_eq!(store.saves, 0);
        assert!(store.stored.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"device_address": 12345678}"#).unwrap();
        assert_eq!(config.device_address, MeterAddress(12_345_678));
        assert_eq!(config.current_divisor, 100);
    }
}
