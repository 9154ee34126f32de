//! Packet framing: the byte-at-a-time decoder and the matching encoder.
//!
//! The decoder never fails. Header or payload checksum errors and oversized
//! packets are logged and dropped. The bytes received after the rejected
//! sync byte are then scanned again, so a valid packet hidden behind a false
//! sync byte is still found.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::crc8;
use super::packet::{HEADER_SIZE, MAX_PAYLOAD_SIZE, Packet, PacketHeader, PacketType, SYNC_BYTE};

/// Encodes a packet into its wire representation.
///
/// # Panics
///
/// Panics if `data` exceeds 65535 bytes or `optional` exceeds 255 bytes.
#[must_use]
pub fn encode(packet_type: PacketType, data: &[u8], optional: &[u8]) -> Bytes {
    let data_size = u16::try_from(data.len()).expect("data exceeds 65535 bytes");
    let optional_size = u8::try_from(optional.len()).expect("optional data exceeds 255 bytes");
    let header = PacketHeader::new(data_size, optional_size, packet_type);

    let mut buf = BytesMut::with_capacity(1 + HEADER_SIZE + header.total_size());
    buf.put_u8(SYNC_BYTE);
    buf.put_slice(&header.to_bytes());
    let payload_start = buf.len();
    buf.put_slice(data);
    buf.put_slice(optional);
    let crc = crc8::checksum(&buf[payload_start..]);
    buf.put_u8(crc);
    buf.freeze()
}

/// Receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for the sync byte.
    WaitSync,
    /// Receiving the header.
    WaitHeader,
    /// Receiving data, optional data and checksum.
    WaitData,
}

/// Byte-at-a-time packet decoder.
#[derive(Debug)]
pub struct PacketDecoder {
    state: DecoderState,
    /// Bytes received since the last sync byte: header, then payload.
    raw: BytesMut,
    header: Option<PacketHeader>,
    ready: VecDeque<Packet>,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    /// Creates a new decoder waiting for a sync byte.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecoderState::WaitSync,
            raw: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD_SIZE),
            header: None,
            ready: VecDeque::new(),
        }
    }

    /// Returns the current receiver state.
    #[must_use]
    pub const fn state(&self) -> DecoderState {
        self.state
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        for &b in data {
            self.push(b);
        }
    }

    /// Returns the next decoded packet, if any.
    pub fn decode(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    /// Returns the number of decoded packets not yet taken.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    fn push(&mut self, b: u8) {
        match self.state {
            DecoderState::WaitSync => {
                if b == SYNC_BYTE {
                    self.raw.clear();
                    self.state = DecoderState::WaitHeader;
                }
            }
            DecoderState::WaitHeader => {
                self.raw.put_u8(b);
                if self.raw.len() == HEADER_SIZE {
                    self.header_complete();
                }
            }
            DecoderState::WaitData => {
                self.raw.put_u8(b);
                let expected = self
                    .header
                    .map_or(HEADER_SIZE, |h| HEADER_SIZE + h.total_size());
                if self.raw.len() >= expected {
                    self.payload_complete();
                }
            }
        }
    }

    fn header_complete(&mut self) {
        let mut raw_header = [0u8; HEADER_SIZE];
        raw_header.copy_from_slice(&self.raw[..HEADER_SIZE]);
        let header = PacketHeader::from_bytes(&raw_header);

        if !header.is_valid() {
            tracing::warn!(
                "header checksum error: expected {:#04x}, found {:#04x}, header data: {}",
                header.expected_checksum(),
                header.checksum,
                hex::encode(raw_header)
            );
            self.resync();
            return;
        }

        let size = header.total_size();
        if size > MAX_PAYLOAD_SIZE {
            tracing::warn!("header with too big size {}, trying to resync", size);
            self.resync();
            return;
        }

        self.header = Some(header);
        self.state = DecoderState::WaitData;
    }

    fn payload_complete(&mut self) {
        let Some(header) = self.header else {
            self.resync();
            return;
        };

        let payload = &self.raw[HEADER_SIZE..];
        let (body, crc) = payload.split_at(payload.len() - 1);
        let expected = crc8::checksum(body);
        if expected != crc[0] {
            tracing::warn!(
                "data checksum error: expected {:#04x}, found {:#04x}, data: {}",
                expected,
                crc[0],
                hex::encode(payload)
            );
            self.resync();
            return;
        }

        let mut raw = self.raw.split();
        raw.advance(HEADER_SIZE);
        raw.truncate(raw.len() - 1);
        self.header = None;
        self.state = DecoderState::WaitSync;
        self.ready.push_back(Packet {
            header,
            payload: raw.freeze(),
        });
    }

    /// Drops the current packet and rescans everything received after its
    /// sync byte.
    fn resync(&mut self) {
        let replay = self.raw.split().freeze();
        self.header = None;
        self.state = DecoderState::WaitSync;
        for &b in &replay {
            self.push(b);
        }
    }
}
