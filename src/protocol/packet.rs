//! ESP3 packet types and the fixed-offset header codec.
//!
//! ```text
//! ┌──────┬─────────────┬──────────┬──────┬──────┬───────────────┬──────────┬──────┐
//! │ 0x55 │ size (BE)   │ opt size │ type │ CRC8 │ data          │ optional │ CRC8 │
//! │  1   │     2       │    1     │  1   │  1   │ size bytes    │ opt size │  1   │
//! └──────┴─────────────┴──────────┴──────┴──────┴───────────────┴──────────┴──────┘
//! ```

use bytes::Bytes;

use super::crc8;

/// Sync byte starting every packet.
pub const SYNC_BYTE: u8 = 0x55;

/// Size of the header following the sync byte, including its checksum.
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (data, optional data and checksum) the decoder buffers.
pub const MAX_PAYLOAD_SIZE: usize = 512 - HEADER_SIZE;

/// Packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Radio telegram.
    RadioErp1,
    /// Response to any packet.
    Response,
    /// Radio subtelegram.
    RadioSubTel,
    /// Event message.
    Event,
    /// Common command.
    CommonCommand,
    /// Smart Ack command.
    SmartAckCommand,
    /// Remote management command.
    RemoteManCommand,
    /// Radio message.
    RadioMessage,
    /// ERP2 protocol radio telegram.
    RadioErp2,
    /// Any other type byte.
    Unknown(u8),
}

impl PacketType {
    /// Parses a packet type from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::RadioErp1,
            0x02 => Self::Response,
            0x03 => Self::RadioSubTel,
            0x04 => Self::Event,
            0x05 => Self::CommonCommand,
            0x06 => Self::SmartAckCommand,
            0x07 => Self::RemoteManCommand,
            0x09 => Self::RadioMessage,
            0x0a => Self::RadioErp2,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::RadioErp1 => 0x01,
            Self::Response => 0x02,
            Self::RadioSubTel => 0x03,
            Self::Event => 0x04,
            Self::CommonCommand => 0x05,
            Self::SmartAckCommand => 0x06,
            Self::RemoteManCommand => 0x07,
            Self::RadioMessage => 0x09,
            Self::RadioErp2 => 0x0a,
            Self::Unknown(other) => other,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(pkt: PacketType) -> Self {
        pkt.as_byte()
    }
}

/// Packet header (past the sync byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Size of the data part.
    pub data_size: u16,
    /// Size of the optional data part.
    pub optional_size: u8,
    /// Packet type.
    pub packet_type: PacketType,
    /// CRC8 of the four fields above.
    pub checksum: u8,
}

impl PacketHeader {
    /// Creates a header with a freshly computed checksum.
    #[must_use]
    pub fn new(data_size: u16, optional_size: u8, packet_type: PacketType) -> Self {
        let mut header = Self {
            data_size,
            optional_size,
            packet_type,
            checksum: 0,
        };
        header.checksum = header.expected_checksum();
        header
    }

    /// Decodes a header from its raw bytes.
    #[must_use]
    pub fn from_bytes(raw: &[u8; HEADER_SIZE]) -> Self {
        Self {
            data_size: u16::from_be_bytes([raw[0], raw[1]]),
            optional_size: raw[2],
            packet_type: PacketType::from_byte(raw[3]),
            checksum: raw[4],
        }
    }

    /// Encodes the header into its raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [size_h, size_l] = self.data_size.to_be_bytes();
        [
            size_h,
            size_l,
            self.optional_size,
            self.packet_type.as_byte(),
            self.checksum,
        ]
    }

    /// Checksum the header fields should carry.
    #[must_use]
    pub fn expected_checksum(&self) -> u8 {
        crc8::checksum(&self.to_bytes()[..HEADER_SIZE - 1])
    }

    /// Returns true if the stored checksum matches the fields.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.checksum == self.expected_checksum()
    }

    /// Number of bytes following the header: data, optional data and checksum.
    #[must_use]
    pub fn total_size(&self) -> usize {
        usize::from(self.data_size) + usize::from(self.optional_size) + 1
    }
}

/// A checksum-validated packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Data followed by optional data, without the trailing checksum.
    pub payload: Bytes,
}

impl Packet {
    /// Returns the packet type.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// Returns the data part.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        let end = usize::from(self.header.data_size).min(self.payload.len());
        &self.payload[..end]
    }

    /// Returns the optional data part.
    #[must_use]
    pub fn optional_data(&self) -> &[u8] {
        let start = usize::from(self.header.data_size).min(self.payload.len());
        &self.payload[start..]
    }
}
