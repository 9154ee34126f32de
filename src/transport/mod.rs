//! Telegram sources.
//!
//! The local transceiver is read over a serial port. Remote receivers can
//! additionally connect over TCP as repeaters.

pub mod repeater;
pub mod serial;

pub use repeater::Repeater;
pub use serial::{SerialConfig, list_ports};
