//! ESP3 serial protocol definitions.
//!
//! This module contains the low-level protocol types including:
//! - CRC8 checksums
//! - Packet header codec and packet types
//! - Packet framing and the resynchronising decoder

pub mod crc8;
pub mod frame;
pub mod packet;

pub use frame::{DecoderState, PacketDecoder, encode as encode_packet};
pub use packet::{HEADER_SIZE, MAX_PAYLOAD_SIZE, Packet, PacketHeader, PacketType, SYNC_BYTE};
