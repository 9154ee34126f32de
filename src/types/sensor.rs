//! Sensor identifiers and command destinations.

use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

/// Length of a sensor ID in bytes.
pub const SENSOR_ID_LEN: usize = 4;

/// Maximum number of bridges a destination mask can address.
pub const MAX_BRIDGES: usize = 8;

/// A 4-byte big-endian address of a physical sensor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorId([u8; SENSOR_ID_LEN]);

impl SensorId {
    /// Creates a sensor ID from its four address bytes.
    #[must_use]
    pub const fn new(bytes: [u8; SENSOR_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Tries to create a sensor ID from a slice.
    ///
    /// Returns `None` if the slice is not exactly 4 bytes.
    #[must_use]
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SENSOR_ID_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Returns the address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SENSOR_ID_LEN] {
        &self.0
    }

    /// Returns the ID as a big-endian integer.
    #[must_use]
    pub const fn raw(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl From<u32> for SensorId {
    fn from(raw: u32) -> Self {
        Self(raw.to_be_bytes())
    }
}

impl fmt::Debug for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorId({self})")
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}")
    }
}

impl FromStr for SensorId {
    type Err = RuleError;

    /// Parses `AA:BB:CC:DD`, each octet exactly two hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RuleError::InvalidSensorId(s.to_string());

        let mut bytes = [0u8; SENSOR_ID_LEN];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            let decoded = hex::decode(part).map_err(|_| invalid())?;
            *byte = match decoded.as_slice() {
                [b] => *b,
                _ => return Err(invalid()),
            };
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// Set of bridges (numbered 1 to 8) a command is routed to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeMask(u8);

impl BridgeMask {
    /// No bridges.
    pub const NONE: Self = Self(0);

    /// Every bridge.
    pub const ALL: Self = Self(0xff);

    /// Creates a mask from a raw bit pattern (bit 0 = bridge 1).
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns the mask with `bridge` (1-based) added.
    ///
    /// Bridge numbers outside of [1,8] leave the mask unchanged.
    #[must_use]
    pub const fn with(self, bridge: u8) -> Self {
        if bridge == 0 || bridge as usize > MAX_BRIDGES {
            return self;
        }
        Self(self.0 | (1 << (bridge - 1)))
    }

    /// Returns true if `bridge` (1-based) is selected.
    #[must_use]
    pub const fn contains(self, bridge: u8) -> bool {
        bridge != 0 && bridge as usize <= MAX_BRIDGES && self.0 & (1 << (bridge - 1)) != 0
    }

    /// Returns true if no bridge is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for BridgeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BridgeMask({:#010b})", self.0)
    }
}

/// Where a mapped command goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A set of bridges by their 1-based position.
    Bridges(BridgeMask),
    /// Every bridge configured with this group id.
    Group(u8),
}

impl Default for Destination {
    fn default() -> Self {
        Self::Bridges(BridgeMask::ALL)
    }
}

impl Destination {
    /// Returns true if the bridge at 1-based `index` with optional `group`
    /// receives commands for this destination.
    #[must_use]
    pub fn selects(self, index: usize, group: Option<u8>) -> bool {
        match self {
            Self::Bridges(mask) => u8::try_from(index).is_ok_and(|i| mask.contains(i)),
            Self::Group(g) => group == Some(g),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridges(mask) if *mask == BridgeMask::ALL => write!(f, "all bridges"),
            Self::Bridges(mask) => {
                write!(f, "bridges")?;
                for bridge in 1..=MAX_BRIDGES as u8 {
                    if mask.contains(bridge) {
                        write!(f, " {bridge}")?;
                    }
                }
                Ok(())
            }
            Self::Group(g) => write!(f, "group {g}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_id_parse_and_display() {
        let id: SensorId = "fe:F5:de:bd".parse().unwrap();
        assert_eq!(id.as_bytes(), &[0xfe, 0xf5, 0xde, 0xbd]);
        assert_eq!(id.raw(), 0xfef5_debd);
        assert_eq!(id.to_string(), "fe:f5:de:bd");
        assert_eq!(SensorId::from(0xfef5_debd), id);
    }

    #[test]
    fn test_sensor_id_rejects_malformed() {
        for bad in ["fe:f5:de", "fe:f5:de:bd:00", "f:f5:de:bd", "fe:f5:de:xz", "fef5debd", ""] {
            assert_eq!(
                bad.parse::<SensorId>(),
                Err(RuleError::InvalidSensorId(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_sensor_id_ordering() {
        let low = SensorId::new([0x00, 0x00, 0x00, 0xff]);
        let high = SensorId::new([0x01, 0x00, 0x00, 0x00]);
        assert!(low < high);
        assert_eq!(SensorId::try_from_bytes(&[1, 0, 0, 0]), Some(high));
        assert_eq!(SensorId::try_from_bytes(&[1, 0, 0]), None);
    }

    #[test]
    fn test_bridge_mask() {
        let mask = BridgeMask::NONE.with(1).with(3).with(9);
        assert!(mask.contains(1));
        assert!(!mask.contains(2));
        assert!(mask.contains(3));
        assert!(!mask.contains(0));
        assert_eq!(mask.bits(), 0b101);
        assert!(BridgeMask::NONE.is_empty());
    }

    #[test]
    fn test_destination_selects() {
        let bridges = Destination::Bridges(BridgeMask::NONE.with(2));
        assert!(bridges.selects(2, None));
        assert!(!bridges.selects(1, Some(2)));

        let group = Destination::Group(4);
        assert!(group.selects(1, Some(4)));
        assert!(!group.selects(1, Some(3)));
        assert!(!group.selects(1, None));

        assert!(Destination::default().selects(8, None));
        assert_eq!(Destination::default().to_string(), "all bridges");
        assert_eq!(bridges.to_string(), "bridges 2");
    }
}
