#![no_main]

use libfuzzer_sys::fuzz_target;
use mercury_rs::mercury::codec::crc16_modbus;
use mercury_rs::mercury::frame::{decode_current_values, decode_energy};

fuzz_target!(|data: &[u8]| {
    // Arbitrary input must be rejected, never panic
    let _ = decode_current_values(data);
    let _ = decode_energy(data);

    // Re-seal the tail with a valid CRC to get past the integrity check and
    // into the BCD decoding, garbage nibbles included
    for len in [14usize, 23] {
        if data.len() >= len {
            let mut frame = data[..len].to_vec();
            let crc = crc16_modbus(&frame[..len - 2]);
            frame[len - 2..].copy_from_slice(&crc.to_le_bytes());

            let decoded = if len == 14 {
                decode_current_values(&frame).map(|_| ())
            } else {
                decode_energy(&frame).map(|_| ())
            };
            assert!(decoded.is_ok());
        }
    }
});
