//! # Mercury Serial Transport
//!
//! The byte transport the meter driver runs on. Any half-duplex port that is
//! `AsyncRead + AsyncWrite` can carry the protocol; real hardware goes through
//! `tokio_serial`, tests through [`MockSerialPort`](crate::mercury::serial_mock::MockSerialPort).

use crate::constants::{DEFAULT_BAUDRATE, DEFAULT_READ_TIMEOUT};
use crate::error::MeterError;
use crate::mercury::driver::Mercury200;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

/// Trait for serial port operations
#[async_trait::async_trait]
pub trait SerialPort: AsyncRead + AsyncWrite + Unpin + Send {
    async fn flush(&mut self) -> Result<(), std::io::Error>;
}

#[async_trait::async_trait]
impl SerialPort for tokio_serial::SerialStream {
    async fn flush(&mut self) -> Result<(), std::io::Error> {
        AsyncWriteExt::flush(self).await
    }
}

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// Upper bound for reading one complete response frame
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: DEFAULT_BAUDRATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Open `port_name` with the meter's line settings (8N1, no flow control)
/// and wrap it in a Mercury 200 driver.
pub fn open_serial(
    port_name: &str,
    config: &SerialConfig,
) -> Result<Mercury200<tokio_serial::SerialStream>, MeterError> {
    let port = tokio_serial::new(port_name, config.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(config.read_timeout)
        .open_native_async()
        .map_err(|e| MeterError::SerialPortError(e.to_string()))?;

    log::info!("Opened {port_name} at {} baud", config.baudrate);
    Ok(Mercury200::new(port, config.read_timeout))
}
