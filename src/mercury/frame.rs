//! # Mercury Frames
//!
//! Request construction and response decoding for the Mercury 200 protocol.
//!
//! ## Wire format
//! - Request: `[addr3 addr2 addr1 addr0 cmd crc_lo crc_hi]` (7 bytes)
//! - Current values response: 14 bytes, payload at 5..12, CRC at 12..14
//! - Energy response: 23 bytes, payload at 5..21, CRC at 21..23
//!
//! Every response starts with the echoed meter address and command. The CRC
//! covers all bytes preceding it and is transmitted low byte first.
//!
//! ## Usage
//! ```rust
//! use mercury_rs::mercury::frame::{build_request, MeterCommand};
//!
//! let request = build_request(0x0A98_7654, MeterCommand::CurrentValues.code());
//! assert_eq!(&request[..5], &[0x0A, 0x98, 0x76, 0x54, 0x63]);
//! ```

use crate::constants::{
    MERCURY200_CV_RESPONSE_LENGTH, MERCURY200_E_RESPONSE_LENGTH, MERCURY_CMD_CURRENT_VALUES,
    MERCURY_CMD_ENERGY, MERCURY_CRC_LENGTH, MERCURY_INVALID_RESPONSE,
    MERCURY_REQUEST_LENGTH, MERCURY_RESPONSE_HEADER_LENGTH,
};
use crate::error::MeterError;
use crate::mercury::codec::{bcd_bytes_to_decimal, bcd_digits_to_decimal, crc16_modbus};
use bytes::{BufMut, BytesMut};
use nom::{
    bytes::complete::take,
    number::complete::{be_u32, be_u8, le_u16},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serial number of a physical meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterAddress(pub u32);

impl fmt::Display for MeterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MeterAddress {
    type Err = MeterError;

    /// Accepts the decimal serial printed on the meter, or `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        };
        parsed
            .map(MeterAddress)
            .map_err(|e| MeterError::Other(format!("invalid meter address '{s}': {e}")))
    }
}

impl From<u32> for MeterAddress {
    fn from(value: u32) -> Self {
        MeterAddress(value)
    }
}

/// Measurement requests understood by the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterCommand {
    /// Voltage, current and active power
    CurrentValues,
    /// Tariff energy accumulators
    Energy,
}

impl MeterCommand {
    pub fn code(self) -> u8 {
        match self {
            MeterCommand::CurrentValues => MERCURY_CMD_CURRENT_VALUES,
            MeterCommand::Energy => MERCURY_CMD_ENERGY,
        }
    }

    /// Size of the response frame the meter sends back.
    pub fn response_len(self) -> usize {
        match self {
            MeterCommand::CurrentValues => MERCURY200_CV_RESPONSE_LENGTH,
            MeterCommand::Energy => MERCURY200_E_RESPONSE_LENGTH,
        }
    }
}

/// Instantaneous values of the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurrentValues {
    /// 0.1 V
    pub voltage: u16,
    /// 0.01 A
    pub current: u16,
    /// W
    pub power: i16,
}

impl CurrentValues {
    /// Sentinel returned for a failed read.
    pub const INVALID: CurrentValues = CurrentValues {
        voltage: MERCURY_INVALID_RESPONSE,
        current: MERCURY_INVALID_RESPONSE,
        power: MERCURY_INVALID_RESPONSE as i16,
    };

    /// A reading is trusted unless its first field carries the sentinel.
    pub fn is_valid(&self) -> bool {
        self.voltage != MERCURY_INVALID_RESPONSE
    }
}

/// Tariff energy accumulators, 0.01 kWh each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnergyReading {
    pub tariffs: [u32; 4],
}

impl EnergyReading {
    /// Sentinel returned for a failed read.
    pub const INVALID: EnergyReading = EnergyReading {
        tariffs: [MERCURY_INVALID_RESPONSE as u32; 4],
    };

    pub fn is_valid(&self) -> bool {
        self.tariffs[0] != MERCURY_INVALID_RESPONSE as u32
    }

    /// Sum over all tariffs.
    pub fn total(&self) -> u32 {
        self.tariffs.iter().fold(0u32, |acc, t| acc.wrapping_add(*t))
    }
}

/// Echoed address and command at the start of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub address: u32,
    pub command: u8,
}

/// Assemble the 7-byte request for `command` addressed to `address`.
pub fn build_request(address: u32, command: u8) -> [u8; MERCURY_REQUEST_LENGTH] {
    let mut buf = BytesMut::with_capacity(MERCURY_REQUEST_LENGTH);
    buf.put_u32(address);
    buf.put_u8(command);
    let crc = crc16_modbus(&buf);
    buf.put_u16_le(crc);

    let mut frame = [0u8; MERCURY_REQUEST_LENGTH];
    frame.copy_from_slice(&buf);
    frame
}

/// Check that the trailing two bytes of `frame` hold the CRC of the rest.
pub fn verify_crc(frame: &[u8]) -> Result<(), MeterError> {
    if frame.len() < MERCURY_CRC_LENGTH {
        return Err(MeterError::InvalidLength {
            expected: MERCURY_CRC_LENGTH,
            actual: frame.len(),
        });
    }
    let (body, tail) = frame.split_at(frame.len() - MERCURY_CRC_LENGTH);
    let expected = u16::from_le_bytes([tail[0], tail[1]]);
    let calculated = crc16_modbus(body);
    if expected != calculated {
        return Err(MeterError::InvalidCrc {
            expected,
            calculated,
        });
    }
    Ok(())
}

fn parse_header(input: &[u8]) -> IResult<&[u8], ResponseHeader> {
    let (input, address) = be_u32(input)?;
    let (input, command) = be_u8(input)?;
    Ok((input, ResponseHeader { address, command }))
}

fn parse_response_body(input: &[u8], payload_len: usize) -> IResult<&[u8], (ResponseHeader, &[u8], u16)> {
    let (input, header) = parse_header(input)?;
    let (input, payload) = take(payload_len)(input)?;
    let (input, crc) = le_u16(input)?;
    Ok((input, (header, payload, crc)))
}

/// Validate length and CRC of a response, returning its header and payload.
pub fn parse_response(frame: &[u8], expected_len: usize) -> Result<(ResponseHeader, &[u8]), MeterError> {
    if frame.len() != expected_len {
        return Err(MeterError::InvalidLength {
            expected: expected_len,
            actual: frame.len(),
        });
    }
    verify_crc(frame)?;

    let payload_len = expected_len - MERCURY_RESPONSE_HEADER_LENGTH - MERCURY_CRC_LENGTH;
    let (_, (header, payload, _crc)) = parse_response_body(frame, payload_len)
        .map_err(|e| MeterError::FrameParseError(format!("{e:?}")))?;
    Ok((header, payload))
}

/// Decode a 14-byte current values response.
///
/// Voltage and current are four BCD digits each, power six. Power is kept in
/// the 16-bit signed slot the readings are reported in, so values beyond
/// `i16` wrap exactly as they do on the node.
pub fn decode_current_values(frame: &[u8]) -> Result<CurrentValues, MeterError> {
    let (_, payload) = parse_response(frame, MERCURY200_CV_RESPONSE_LENGTH)?;

    Ok(CurrentValues {
        voltage: bcd_digits_to_decimal(&payload[0..2]) as u16,
        current: bcd_digits_to_decimal(&payload[2..4]) as u16,
        power: bcd_digits_to_decimal(&payload[4..7]) as u16 as i16,
    })
}

/// Decode a 23-byte energy response into four tariff accumulators.
pub fn decode_energy(frame: &[u8]) -> Result<EnergyReading, MeterError> {
    let (_, payload) = parse_response(frame, MERCURY200_E_RESPONSE_LENGTH)?;

    let mut tariffs = [0u32; 4];
    for (tariff, chunk) in tariffs.iter_mut().zip(payload.chunks_exact(4)) {
        *tariff = bcd_bytes_to_decimal(chunk);
    }
    Ok(EnergyReading { tariffs })
}

/// Build a well-formed response frame around `payload` (meter side of the
/// protocol, used by the serial mock and tests).
pub fn build_response(address: u32, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MERCURY_RESPONSE_HEADER_LENGTH + payload.len() + MERCURY_CRC_LENGTH);
    buf.put_u32(address);
    buf.put_u8(command);
    buf.put_slice(payload);
    let crc = crc16_modbus(&buf);
    buf.put_u16_le(crc);
    buf.to_vec()
}
