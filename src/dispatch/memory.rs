//! In-memory [`Link`] recording the requests written to it.
//!
//! Answers every request with a canned response. Readiness, partial writes
//! and failures can be controlled to drive a [`Dispatcher`] through all of its
//! states without a network.
//!
//! [`Dispatcher`]: super::Dispatcher

use std::io;

use bytes::{Bytes, BytesMut};

use super::Link;

const DEFAULT_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n[]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    Immediate,
    Deferred,
    Refused,
}

/// A scripted in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    mode: ConnectMode,
    connecting: bool,
    connect_ready: bool,
    connected: bool,
    connects: usize,
    writable: bool,
    readable: bool,
    write_chunk: usize,
    write_error: Option<io::ErrorKind>,
    response: Bytes,
    read_pos: usize,
    written: BytesMut,
    requests: Vec<Bytes>,
}

impl MemoryLink {
    /// Creates a link that connects at once and answers `200 OK`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: ConnectMode::Immediate,
            connecting: false,
            connect_ready: false,
            connected: false,
            connects: 0,
            writable: true,
            readable: true,
            write_chunk: usize::MAX,
            write_error: None,
            response: Bytes::from_static(DEFAULT_RESPONSE),
            read_pos: 0,
            written: BytesMut::new(),
            requests: Vec::new(),
        }
    }

    /// Keeps connections pending until [`Self::complete_connect`].
    #[must_use]
    pub const fn deferred_connect(mut self) -> Self {
        self.mode = ConnectMode::Deferred;
        self
    }

    /// Refuses every connection.
    #[must_use]
    pub const fn refuse_connect(mut self) -> Self {
        self.mode = ConnectMode::Refused;
        self
    }

    /// Accepts at most `chunk` bytes per write.
    #[must_use]
    pub const fn write_chunk(mut self, chunk: usize) -> Self {
        self.write_chunk = chunk;
        self
    }

    /// Sets the response returned for every request.
    #[must_use]
    pub fn response(mut self, response: Bytes) -> Self {
        self.response = response;
        self
    }

    /// Establishes a deferred connection.
    pub fn complete_connect(&mut self) {
        if self.connecting {
            self.connect_ready = true;
        }
    }

    /// Makes writes block (`false`) or proceed (`true`).
    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    /// Makes reads block (`false`) or proceed (`true`).
    pub fn set_readable(&mut self, readable: bool) {
        self.readable = readable;
    }

    /// Fails every write with `kind`, or stops failing with `None`.
    pub fn fail_writes(&mut self, kind: Option<io::ErrorKind>) {
        self.write_error = kind;
    }

    /// Returns true while a connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns how many connections were attempted.
    #[must_use]
    pub const fn connects(&self) -> usize {
        self.connects
    }

    /// Returns the bytes written on each closed connection.
    #[must_use]
    pub fn requests(&self) -> &[Bytes] {
        &self.requests
    }

    /// Returns the status values carried by the recorded requests.
    #[must_use]
    pub fn posted_values(&self) -> Vec<i32> {
        self.requests
            .iter()
            .filter_map(|request| status_value(request))
            .collect()
    }
}

impl Default for MemoryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for MemoryLink {
    fn connect(&mut self) -> io::Result<bool> {
        self.connects += 1;
        self.read_pos = 0;
        match self.mode {
            ConnectMode::Immediate => {
                self.connected = true;
                Ok(true)
            }
            ConnectMode::Deferred => {
                self.connecting = true;
                self.connect_ready = false;
                Ok(false)
            }
            ConnectMode::Refused => Err(io::ErrorKind::ConnectionRefused.into()),
        }
    }

    fn poll_connect(&mut self) -> io::Result<bool> {
        if self.connected {
            return Ok(true);
        }
        if !self.connecting {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if self.connect_ready {
            self.connecting = false;
            self.connected = true;
        }
        Ok(self.connected)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(kind.into());
        }
        if !self.connected {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if !self.writable {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.write_chunk);
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.connected {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if !self.readable {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let remaining = &self.response[self.read_pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }

    fn close(&mut self) {
        if !self.written.is_empty() {
            self.requests.push(self.written.split().freeze());
        }
        self.connecting = false;
        self.connect_ready = false;
        self.connected = false;
    }
}

/// Extracts `V` from a request ending in `{"state":{"status": V}}`.
fn status_value(request: &[u8]) -> Option<i32> {
    let text = std::str::from_utf8(request).ok()?;
    let (_, body) = text.split_once("\r\n\r\n")?;
    body.strip_prefix("{\"state\":{\"status\": ")?
        .strip_suffix("}}")?
        .parse()
        .ok()
}
