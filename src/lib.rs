//! # enocean-hue
//!
//! A gateway forwarding EnOcean switch and contact telegrams to Philips Hue
//! bridges.
//!
//! An EnOcean transceiver streams ESP3 packets over a serial port. Radio
//! telegrams from rocker switches and contacts are mapped to integer values
//! by a rule file and posted as the status of a `CLIPGenericStatus` sensor on
//! one or more bridges, where bridge rules react to them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use enocean_hue::{BridgeConfig, CommandMapper, Gateway};
//! use enocean_hue::transport::{SerialConfig, serial};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), enocean_hue::Error> {
//!     let mapper = CommandMapper::from_rules("fe:f5:de:bd -2 100")?;
//!     let bridge: BridgeConfig = "192.168.1.128:api-key:36".parse()?;
//!
//!     let mut gateway = Gateway::new(mapper, [bridge]);
//!     let port = serial::open(&SerialConfig::new("/dev/ttyUSB0"))?;
//!     gateway.run(port, None).await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - ESP3 framing, CRC8 and the resynchronising decoder
//! - [`types`] - Sensor IDs, destinations and decoded telegrams
//! - [`mapping`] - Rule grammar and the telegram to command mapper
//! - [`dispatch`] - Per-bridge non-blocking HTTP dispatch
//! - [`router`] - Duplicate suppression and fan-out to dispatchers
//! - [`transport`] - Serial port and TCP repeater sources
//! - [`gateway`] - The event loop tying it all together

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use clock::{MonotonicClock, Timestamp};
pub use config::{BridgeConfig, GatewayConfig};
pub use dispatch::{Dispatcher, DispatcherState, Link, MemoryLink, StallCheck, TcpLink};
pub use error::{Error, Result, RuleError};
pub use gateway::Gateway;
pub use mapping::{CommandMapper, MappingEntry};
pub use protocol::{Packet, PacketDecoder, PacketType};
pub use router::{RouteOutcome, Router};
pub use transport::{SerialConfig, list_ports};
pub use types::{Destination, SensorId, Telegram};
