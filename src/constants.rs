//! Mercury Protocol and Reporting Constants
//!
//! Wire-level constants of the Mercury 200 serial protocol, plus the cluster
//! and attribute identifiers the readings are reported under.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Meter commands and frame sizes
// ----------------------------------------------------------------------------

/// Command code requesting voltage, current and power
pub const MERCURY_CMD_CURRENT_VALUES: u8 = 0x63;

/// Command code requesting the tariff energy accumulators
pub const MERCURY_CMD_ENERGY: u8 = 0x27;

/// Request frame: 4 address bytes, command, 2 CRC bytes
pub const MERCURY_REQUEST_LENGTH: usize = 7;

/// Response to `MERCURY_CMD_CURRENT_VALUES`
pub const MERCURY200_CV_RESPONSE_LENGTH: usize = 14;

/// Response to `MERCURY_CMD_ENERGY`
pub const MERCURY200_E_RESPONSE_LENGTH: usize = 23;

/// Echoed address and command preceding every response payload
pub const MERCURY_RESPONSE_HEADER_LENGTH: usize = 5;

/// Trailing CRC16 of every frame
pub const MERCURY_CRC_LENGTH: usize = 2;

/// Sentinel marking a failed read
pub const MERCURY_INVALID_RESPONSE: u16 = 0xFFFF;

// CRC16/Modbus parameters
pub const CRC16_MODBUS_POLY: u16 = 0xA001;
pub const CRC16_MODBUS_INIT: u16 = 0xFFFF;

// ----------------------------------------------------------------------------
// Serial defaults
// ----------------------------------------------------------------------------

pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

// ----------------------------------------------------------------------------
// Timing of the application events
// ----------------------------------------------------------------------------

/// Interval between two poll phases
pub const POLL_PERIOD: Duration = Duration::from_millis(500);

/// Delay between an attribute write and persisting the config block
pub const SAVE_ATTRS_DELAY: Duration = Duration::from_millis(2000);

pub const DEFAULT_DEVICE_ADDRESS: u32 = 11_111_111;
pub const DEFAULT_MEASUREMENT_PERIOD: u16 = 30;

// ----------------------------------------------------------------------------
// Reporting identifiers (ZCL)
// ----------------------------------------------------------------------------

pub const REPORT_ENDPOINT: u8 = 1;

pub const CLUSTER_TEMPERATURE: u16 = 0x0402;
pub const CLUSTER_SE_METERING: u16 = 0x0702;
pub const CLUSTER_ELECTRICAL: u16 = 0x0B04;

pub const ATTRID_TEMPERATURE_MEASURED_VALUE: u16 = 0x0000;

pub const ATTRID_ELECTRICAL_RMS_VOLTAGE: u16 = 0x0505;
pub const ATTRID_ELECTRICAL_RMS_CURRENT: u16 = 0x0508;
pub const ATTRID_ELECTRICAL_ACTIVE_POWER: u16 = 0x050B;

pub const ATTRID_SE_METERING_CURR_TIER1_SUMM_DLVD: u16 = 0x0100;
pub const ATTRID_SE_METERING_CURR_TIER2_SUMM_DLVD: u16 = 0x0102;
pub const ATTRID_SE_METERING_CURR_TIER3_SUMM_DLVD: u16 = 0x0104;
pub const ATTRID_SE_METERING_CURR_TIER4_SUMM_DLVD: u16 = 0x0106;

/// Tier attributes in tariff order
pub const ATTRID_SE_METERING_TIERS: [u16; 4] = [
    ATTRID_SE_METERING_CURR_TIER1_SUMM_DLVD,
    ATTRID_SE_METERING_CURR_TIER2_SUMM_DLVD,
    ATTRID_SE_METERING_CURR_TIER3_SUMM_DLVD,
    ATTRID_SE_METERING_CURR_TIER4_SUMM_DLVD,
];

// Writable configuration attributes on the metering cluster
pub const ATTRID_CUSTOM_DEVICE_ADDRESS: u16 = 0xF001;
pub const ATTRID_CUSTOM_MEASUREMENT_PERIOD: u16 = 0xF002;
