//! The mercury module contains the meter protocol: the frame codec, request
//! and response frames, the serial transport and the model drivers.

pub mod codec;
pub mod driver;
pub mod frame;
pub mod serial;
pub mod serial_mock;

pub use codec::{
    bcd_bytes_to_decimal, bcd_digits_to_decimal, bcd_nibble_pair_to_decimal, crc16_modbus,
};
pub use driver::{Mercury200, MeterDriver};
pub use frame::{
    build_request, build_response, decode_current_values, decode_energy, parse_response,
    verify_crc, CurrentValues, EnergyReading, MeterAddress, MeterCommand, ResponseHeader,
};
pub use serial::{open_serial, SerialConfig, SerialPort};
pub use serial_mock::MockSerialPort;
