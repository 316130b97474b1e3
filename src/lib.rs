//! # mercury-rs - A Rust Crate for Mercury 200 Electricity Meters
//!
//! The mercury-rs crate polls a Mercury 200 single-phase electricity meter over
//! its serial interface, caches the decoded readings and hands them to a
//! report sink, the way a metering sensor node does.
//!
//! ## Features
//!
//! - Build request frames and validate responses with CRC16/Modbus
//! - Decode the packed BCD voltage, current, power and tariff energy fields
//! - Poll the meter in short non-blocking phases driven by a timer
//! - Persist the node configuration (meter address, report period) as JSON
//! - Report readings to the log or as JSON lines
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mercury-rs = "0.1.0"
//! ```
//!
//! ```rust,no_run
//! use mercury_rs::{connect, LogSink, MeterAddress, Poller};
//!
//! # async fn demo() -> Result<(), mercury_rs::MeterError> {
//! let meter = connect("/dev/ttyUSB0").await?;
//! let mut poller = Poller::new(meter, MeterAddress(11_111_111));
//! let reading = poller.run_cycle(&mut LogSink).await?;
//! println!("{:?}", reading.current);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod mercury;
pub mod poller;
pub mod report;
pub mod scheduler;
pub mod sensor;
pub mod util;

pub use crate::error::MeterError;
pub use crate::logging::{init_logger, log_info};

// Protocol and transport
pub use mercury::{
    CurrentValues, EnergyReading, Mercury200, MeterAddress, MeterCommand, MeterDriver,
    MockSerialPort, SerialConfig, SerialPort,
};

// Polling and collaborators
pub use app::MeterApp;
pub use config::{AppConfig, ConfigStore, JsonFileStore, MemoryStore};
pub use poller::{CachedReading, PollPhase, PollState, Poller};
pub use report::{
    AttributeValue, JsonLinesSink, LogSink, RecordingSink, ReportCommand, ReportSink,
};
pub use scheduler::{AppEvent, ManualScheduler, PowerHint, Scheduler, TokioScheduler};
pub use sensor::{AuxSensor, W1TemperatureSensor};

/// Open a meter on a serial port with the default settings (9600 8N1).
///
/// # Arguments
/// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
///
/// # Returns
/// * `Ok(Mercury200)` - Driver owning the opened port
/// * `Err(MeterError)` - The port could not be opened
pub async fn connect(
    port: &str,
) -> Result<Mercury200<tokio_serial::SerialStream>, MeterError> {
    mercury::open_serial(port, &SerialConfig::default())
}

/// Read the current values of one meter: a request followed by its answer.
///
/// Returns `CurrentValues::INVALID` when the meter did not answer correctly.
pub async fn read_current_values<D: MeterDriver>(
    driver: &mut D,
    address: MeterAddress,
) -> Result<CurrentValues, MeterError> {
    driver
        .request_measure(address, MeterCommand::CurrentValues)
        .await?;
    Ok(driver.read_current_values().await)
}

/// Read the tariff accumulators of one meter.
///
/// Returns `EnergyReading::INVALID` when the meter did not answer correctly.
pub async fn read_energy<D: MeterDriver>(
    driver: &mut D,
    address: MeterAddress,
) -> Result<EnergyReading, MeterError> {
    driver.request_measure(address, MeterCommand::Energy).await?;
    Ok(driver.read_energy().await)
}
