//! Data types shared across the gateway.
//!
//! - Sensor identifiers and command destinations
//! - Decoded telegrams

pub mod sensor;
pub mod telegram;

pub use sensor::{BridgeMask, Destination, MAX_BRIDGES, SensorId};
pub use telegram::{Erp1Type, MAX_BUTTON, Telegram, button_id};
