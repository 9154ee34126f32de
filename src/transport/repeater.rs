//! Remote receivers streaming ESP3 bytes over TCP.
//!
//! A repeater is another EnOcean receiver placed where the gateway's own
//! transceiver has poor reception. It connects to the gateway and forwards
//! the raw serial byte stream. Each connection gets its own decoder, so a
//! packet split across reads is reassembled independently of other sources.

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::protocol::{Packet, PacketDecoder};

const READ_BUFFER_SIZE: usize = 512;

/// An accepted repeater connection.
#[derive(Debug)]
pub struct Repeater {
    peer: SocketAddr,
    stream: TcpStream,
    decoder: PacketDecoder,
}

impl Repeater {
    /// Wraps an accepted connection.
    #[must_use]
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            peer,
            stream,
            decoder: PacketDecoder::new(),
        }
    }

    /// Returns the remote address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Waits until the connection has data or was closed. Cancel safe.
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    /// Reads everything available without blocking and returns the complete
    /// packets received so far.
    ///
    /// Returns `Ok(None)` once the repeater closed the connection.
    pub fn read_packets(&mut self) -> io::Result<Option<Vec<Packet>>> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    tracing::trace!("repeater {}: {}", self.peer, hex::encode(&buf[..n]));
                    self.decoder.feed(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Some(std::iter::from_fn(|| self.decoder.decode()).collect()))
    }
}
