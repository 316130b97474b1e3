//! # Utility Modules
//!
//! Hex formatting and logging helpers shared by the driver, the CLI and the
//! tests.

pub mod hex;
pub mod logging;

pub use hex::{encode_hex_upper, format_hex_compact, parse_hex_lenient};
pub use logging::{log_frame_hex, LogThrottle};
