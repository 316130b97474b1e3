//! # Mercury Frame Codec
//!
//! Pure byte transformations used on the Mercury serial link: the CRC16/Modbus
//! integrity check and the packed BCD decoding of the measurement fields.
//!
//! Nothing in this module can fail; out-of-range BCD nibbles (0xA..0xF) are
//! passed through with their literal value, exactly as the meter firmware
//! reference does, so a corrupted digit yields a deterministic number rather
//! than an error.

use crate::constants::{CRC16_MODBUS_INIT, CRC16_MODBUS_POLY};

/// Calculate the CRC16/Modbus of `data`.
///
/// Reflected polynomial 0xA001, initial value 0xFFFF, bits processed LSB
/// first, no final XOR. The result goes on the wire low byte first.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = CRC16_MODBUS_INIT;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_MODBUS_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Decode one packed BCD byte into its two-digit value (`0x12` -> 12).
///
/// High nibble weighs ten, low nibble one. Nibbles above 9 are not rejected.
pub fn bcd_nibble_pair_to_decimal(byte: u8) -> u32 {
    ((byte >> 4) & 0x0F) as u32 * 10 + (byte & 0x0F) as u32
}

/// Decode a run of BCD nibbles, most significant first.
///
/// Each nibble is one decimal digit weighted by successive powers of ten, so
/// `[0x23, 0x05]` is 2305. Used for the voltage, current and power fields.
pub fn bcd_digits_to_decimal(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .flat_map(|&byte| [byte >> 4, byte & 0x0F])
        .fold(0u32, |acc, digit| {
            acc.wrapping_mul(10).wrapping_add(digit as u32)
        })
}

/// Decode a big-endian run of packed BCD bytes.
///
/// Every byte contributes two decimal digits, most significant byte first:
/// `[0x00, 0x12, 0x34, 0x56]` decodes to `123456`. Arithmetic wraps so that
/// garbage nibbles in long fields can never panic.
pub fn bcd_bytes_to_decimal(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &byte| {
        acc.wrapping_mul(100)
            .wrapping_add(bcd_nibble_pair_to_decimal(byte))
    })
}
