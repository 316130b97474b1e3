//! # Meter Error Handling
//!
//! This module defines the MeterError enum, which represents the different error
//! types that can occur in the mercury-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur in the crate.
#[derive(Debug, Error)]
pub enum MeterError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// The meter did not answer within the read timeout.
    #[error("Timed out waiting for meter response")]
    Timeout,

    /// Indicates a CRC mismatch on a received frame.
    #[error("Invalid CRC: expected 0x{expected:04X}, calculated 0x{calculated:04X}")]
    InvalidCrc { expected: u16, calculated: u16 },

    /// Indicates a frame of unexpected size.
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Indicates an error when parsing a meter frame.
    #[error("Error parsing meter frame: {0}")]
    FrameParseError(String),

    /// A poll cycle was requested while another one is still running.
    #[error("Poll cycle already in progress")]
    PollInProgress,

    /// Indicates a failure of the auxiliary sensor.
    #[error("Sensor error: {0}")]
    SensorError(String),

    /// Indicates a failure loading or storing the configuration block.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Write to an attribute that is not writable.
    #[error("Unknown attribute: 0x{0:04X}")]
    UnknownAttribute(u16),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,

    /// A catch‑all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<std::io::Error> for MeterError {
    fn from(err: std::io::Error) -> Self {
        MeterError::SerialPortError(err.to_string())
    }
}

impl From<serde_json::Error> for MeterError {
    fn from(err: serde_json::Error) -> Self {
        MeterError::ConfigError(err.to_string())
    }
}
