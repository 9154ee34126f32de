//! Gateway configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;
use crate::transport::SerialConfig;

/// Default HTTP port of a bridge.
pub const DEFAULT_BRIDGE_PORT: u16 = 80;

/// A bridge and the virtual sensor commands are posted to.
///
/// The sensor is a `CLIPGenericStatus` sensor created on the bridge
/// beforehand. Rules on the bridge react to changes of its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Bridge IPv4 address.
    pub addr: Ipv4Addr,
    /// Bridge HTTP port.
    pub port: u16,
    /// API key assigned by the bridge.
    pub api_key: String,
    /// Sensor ID assigned by the bridge.
    pub sensor_id: u32,
    /// Group this bridge belongs to, for `group` rules.
    pub group: Option<u8>,
}

impl BridgeConfig {
    /// Creates a bridge configuration with the default port and no group.
    #[must_use]
    pub fn new(addr: Ipv4Addr, api_key: impl Into<String>, sensor_id: u32) -> Self {
        Self {
            addr,
            port: DEFAULT_BRIDGE_PORT,
            api_key: api_key.into(),
            sensor_id,
            group: None,
        }
    }

    /// Sets the HTTP port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the group.
    #[must_use]
    pub const fn group(mut self, group: u8) -> Self {
        self.group = Some(group);
        self
    }

    /// Returns the socket address to connect to.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.addr, self.port))
    }
}

impl FromStr for BridgeConfig {
    type Err = Error;

    /// Parses `ip:api_key:sensor_id[:group]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidBridge {
            reason: format!("{reason} in {s:?}, expected ip:api_key:sensor_id[:group]"),
        };

        let parts: Vec<&str> = s.split(':').collect();
        let (addr, api_key, sensor_id, group) = match parts.as_slice() {
            [addr, key, sensor] => (addr, key, sensor, None),
            [addr, key, sensor, group] => (addr, key, sensor, Some(group)),
            _ => return Err(invalid("wrong number of fields")),
        };

        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("invalid IPv4 address"))?;
        if api_key.is_empty() {
            return Err(invalid("empty API key"));
        }
        let sensor_id: u32 = sensor_id
            .parse()
            .map_err(|_| invalid("invalid sensor ID"))?;

        let mut bridge = Self::new(addr, *api_key, sensor_id);
        if let Some(group) = group {
            bridge = bridge.group(group.parse().map_err(|_| invalid("invalid group"))?);
        }
        Ok(bridge)
    }
}

/// Everything needed to run the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Serial device with the EnOcean transceiver.
    pub serial: SerialConfig,
    /// Bridges, numbered from 1 in `bridge` rules.
    pub bridges: Vec<BridgeConfig>,
    /// Mapping rule file.
    pub rules: PathBuf,
    /// Address to accept repeater connections on.
    pub listen: Option<SocketAddr>,
}

impl GatewayConfig {
    /// Creates a configuration without bridges or repeater listener.
    #[must_use]
    pub fn new(serial: SerialConfig, rules: impl Into<PathBuf>) -> Self {
        Self {
            serial,
            bridges: Vec::new(),
            rules: rules.into(),
            listen: None,
        }
    }

    /// Adds a bridge.
    #[must_use]
    pub fn bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridges.push(bridge);
        self
    }

    /// Sets the repeater listen address.
    #[must_use]
    pub const fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = Some(addr);
        self
    }
}
