//! # Meter Drivers
//!
//! [`MeterDriver`] is the seam between the poller and a concrete meter model.
//! A driver turns `(address, command)` into a request on the wire and turns
//! the fixed-length answer into typed, CRC-validated readings.
//!
//! Read failures never surface as errors: a timeout, an I/O error or a CRC
//! mismatch all yield the sentinel reading (`CurrentValues::INVALID`,
//! `EnergyReading::INVALID`), which the caller treats as "no update this
//! cycle".

use crate::error::MeterError;
use crate::logging::log_debug;
use crate::mercury::frame::{
    build_request, decode_current_values, decode_energy, CurrentValues, EnergyReading,
    MeterAddress, MeterCommand,
};
use crate::mercury::serial::SerialPort;
use crate::util::logging::{log_frame_hex, LogThrottle};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

/// One implementation per supported meter model.
#[async_trait::async_trait]
pub trait MeterDriver: Send {
    /// Model name used in logs
    fn model(&self) -> &'static str;

    /// Write a measurement request. Does not wait for the answer.
    async fn request_measure(
        &mut self,
        address: MeterAddress,
        command: MeterCommand,
    ) -> Result<(), MeterError>;

    /// Read the answer to a `CurrentValues` request.
    async fn read_current_values(&mut self) -> CurrentValues;

    /// Read the answer to an `Energy` request.
    async fn read_energy(&mut self) -> EnergyReading;
}

/// Driver for the Mercury 200 single-phase meter.
pub struct Mercury200<P: SerialPort> {
    port: P,
    read_timeout: Duration,
    invalid_throttle: LogThrottle,
}

impl<P: SerialPort> Mercury200<P> {
    pub fn new(port: P, read_timeout: Duration) -> Self {
        Mercury200 {
            port,
            read_timeout,
            invalid_throttle: LogThrottle::new(60_000, 5),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Read exactly `len` bytes, bounded by the read timeout.
    async fn read_frame(&mut self, len: usize) -> Result<Vec<u8>, MeterError> {
        let mut buf = vec![0u8; len];
        timeout(self.read_timeout, self.port.read_exact(&mut buf))
            .await
            .map_err(|_| MeterError::Timeout)?
            .map_err(|e| MeterError::SerialPortError(e.to_string()))?;

        log_frame_hex("Mercury received", &buf);
        Ok(buf)
    }

    /// Read and decode one response.
    ///
    /// On a CRC mismatch one more frame of the same length is read and
    /// discarded. If the first read started in the middle of a frame, this
    /// drains the remainder so the next cycle starts aligned. It is a
    /// heuristic: nothing guarantees the drained bytes are the tail of that
    /// frame.
    async fn read_response<T>(
        &mut self,
        len: usize,
        decode: fn(&[u8]) -> Result<T, MeterError>,
    ) -> Result<T, MeterError> {
        let frame = self.read_frame(len).await?;
        match decode(&frame) {
            Err(err @ MeterError::InvalidCrc { .. }) => {
                if let Err(e) = self.read_frame(len).await {
                    log_debug(&format!("Resync read after CRC mismatch failed: {e}"));
                }
                Err(err)
            }
            other => other,
        }
    }

    fn report_invalid(&mut self, what: &str, err: &MeterError) {
        if self.invalid_throttle.allow() {
            log::warn!("Invalid {what} response from meter: {err}");
        } else {
            log::debug!("Invalid {what} response from meter: {err}");
        }
    }
}

#[async_trait::async_trait]
impl<P: SerialPort> MeterDriver for Mercury200<P> {
    fn model(&self) -> &'static str {
        "Mercury 200"
    }

    async fn request_measure(
        &mut self,
        address: MeterAddress,
        command: MeterCommand,
    ) -> Result<(), MeterError> {
        let request = build_request(address.0, command.code());
        self.port
            .write_all(&request)
            .await
            .map_err(|e| MeterError::SerialPortError(e.to_string()))?;
        SerialPort::flush(&mut self.port)
            .await
            .map_err(|e| MeterError::SerialPortError(e.to_string()))?;

        log_frame_hex("Mercury sent", &request);
        Ok(())
    }

    async fn read_current_values(&mut self) -> CurrentValues {
        let len = MeterCommand::CurrentValues.response_len();
        match self.read_response(len, decode_current_values).await {
            Ok(values) => values,
            Err(err) => {
                self.report_invalid("current values", &err);
                CurrentValues::INVALID
            }
        }
    }

    async fn read_energy(&mut self) -> EnergyReading {
        let len = MeterCommand::Energy.response_len();
        match self.read_response(len, decode_energy).await {
            Ok(energy) => energy,
            Err(err) => {
                self.report_invalid("energy", &err);
                EnergyReading::INVALID
            }
        }
    }
}
