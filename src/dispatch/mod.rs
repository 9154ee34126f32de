//! Non-blocking command dispatch to bridges.
//!
//! Each bridge gets one [`Dispatcher`]. It keeps at most one HTTP request in
//! flight and queues the commands arriving in the meantime. The dispatcher
//! never blocks: [`Dispatcher::poll`] performs whatever work the underlying
//! [`Link`] allows right now and returns.
//!
//! ```text
//!          post                 connected              all written
//!   Idle ---------> Connecting ----------> Sending ----------------> Receiving
//!    ^                  |                     |                         |
//!    |                  +---------------------+-------------------------+
//!    +------------- error, or end of response: next fresh command ------+
//! ```
//!
//! Commands wait at most [`MAX_EVENT_AGE_MS`] in the queue. A user pressing
//! a switch while the bridge is unreachable should not see the light flip
//! seconds later.

pub mod memory;
pub mod request;
pub mod tcp;

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;

use crate::clock::Timestamp;
use crate::config::BridgeConfig;

pub use memory::MemoryLink;
pub use tcp::TcpLink;

/// Maximum number of commands waiting behind the request in flight.
pub const MAX_QUEUE_SIZE: usize = 4;

/// Maximum age of a queued command when its request is started.
pub const MAX_EVENT_AGE_MS: u64 = 500;

/// Age of a request at which the first stall warning is logged.
pub const STALL_REPORT_MS: u64 = 500;

/// Age after which a stalled request is aborted.
pub const STALL_ABORT_MS: u64 = 8000;

const RECEIVE_BUFFER_SIZE: usize = 512;

/// Non-blocking byte stream to a bridge.
///
/// Every method returns immediately. Operations that cannot make progress
/// yet fail with [`io::ErrorKind::WouldBlock`].
pub trait Link {
    /// Starts a new connection.
    ///
    /// Returns `Ok(true)` if the connection is already established and
    /// `Ok(false)` if it is still in progress.
    fn connect(&mut self) -> io::Result<bool>;

    /// Checks a connection in progress. Returns `Ok(true)` once established.
    fn poll_connect(&mut self) -> io::Result<bool>;

    /// Writes some bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Reads some bytes. `Ok(0)` signals the end of the response.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Closes the connection, if any.
    fn close(&mut self);
}

/// Dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No request in flight.
    Idle,
    /// Waiting for the connection to the bridge.
    Connecting,
    /// Writing the request.
    Sending,
    /// Reading the response until the bridge closes the connection.
    Receiving,
}

/// A command waiting for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    /// Value to post.
    pub value: i32,
    /// When the command was posted.
    pub timestamp: Timestamp,
}

/// Result of [`Dispatcher::check_stall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallCheck {
    /// Nothing to report.
    Healthy,
    /// The request in flight is taking long, a warning was logged.
    Reported {
        /// Request age in milliseconds.
        age: u64,
    },
    /// The request in flight was abandoned.
    Aborted {
        /// Request age in milliseconds.
        age: u64,
    },
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests answered with a 2xx status.
    pub delivered: u64,
    /// Requests that failed or were rejected.
    pub failed: u64,
    /// Commands discarded because the queue was full or they were stale.
    pub dropped: u64,
}

#[derive(Debug)]
struct InFlight {
    value: i32,
    request: Bytes,
    written: usize,
    started: Timestamp,
    next_report: u64,
    status: Option<u16>,
}

enum Step {
    Continue,
    Blocked,
    Complete,
}

/// Per-bridge request queue and state machine.
#[derive(Debug)]
pub struct Dispatcher<L> {
    bridge: BridgeConfig,
    link: L,
    state: DispatcherState,
    queue: VecDeque<PendingCommand>,
    current: Option<InFlight>,
    stats: DispatchStats,
}

impl<L: Link> Dispatcher<L> {
    /// Creates an idle dispatcher for `bridge`, talking through `link`.
    pub fn new(bridge: BridgeConfig, link: L) -> Self {
        Self {
            bridge,
            link,
            state: DispatcherState::Idle,
            queue: VecDeque::with_capacity(MAX_QUEUE_SIZE),
            current: None,
            stats: DispatchStats::default(),
        }
    }

    /// Returns the bridge this dispatcher posts to.
    pub const fn bridge(&self) -> &BridgeConfig {
        &self.bridge
    }

    /// Returns the link.
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Returns the link mutably.
    pub const fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Returns the current state.
    pub const fn state(&self) -> DispatcherState {
        self.state
    }

    /// Returns true if no request is in flight.
    pub fn is_idle(&self) -> bool {
        self.state == DispatcherState::Idle
    }

    /// Returns the number of queued commands, excluding the one in flight.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns the queued commands, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &PendingCommand> {
        self.queue.iter()
    }

    /// Returns the dispatch counters.
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Returns the age of the request in flight.
    pub fn request_age(&self, now: Timestamp) -> Option<u64> {
        self.current
            .as_ref()
            .map(|flight| now.saturating_sub(flight.started))
    }

    /// Returns how many request bytes are still to be written.
    pub fn bytes_outstanding(&self) -> Option<usize> {
        self.current
            .as_ref()
            .map(|flight| flight.request.len() - flight.written)
    }

    /// Queues a command and starts working on it if idle.
    ///
    /// When the queue is full the oldest waiting command is dropped.
    pub fn post(&mut self, value: i32, now: Timestamp) {
        if self.queue.len() >= MAX_QUEUE_SIZE {
            if let Some(dropped) = self.queue.pop_front() {
                self.stats.dropped += 1;
                tracing::warn!(
                    "bridge {}: queue full, dropping command {}",
                    self.bridge.addr,
                    dropped.value
                );
            }
        }
        self.queue.push_back(PendingCommand {
            value,
            timestamp: now,
        });

        if self.is_idle() {
            self.start_next(now);
            self.poll(now);
        }
    }

    /// Advances the request in flight as far as possible without blocking.
    ///
    /// A finished or failed request is followed by the next fresh command.
    /// Failed requests are not retried.
    pub fn poll(&mut self, now: Timestamp) {
        loop {
            let step = match self.state {
                DispatcherState::Idle => return,
                DispatcherState::Connecting => self.poll_connecting(),
                DispatcherState::Sending => self.poll_sending(),
                DispatcherState::Receiving => self.poll_receiving(),
            };

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Blocked) => return,
                Ok(Step::Complete) => self.finish(now, None),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => self.finish(now, Some(e)),
            }
        }
    }

    /// Logs requests that are taking long and aborts them eventually.
    ///
    /// The first warning comes after [`STALL_REPORT_MS`], each further one
    /// after twice the previous interval. Requests older than
    /// [`STALL_ABORT_MS`] are abandoned and the next command is started.
    pub fn check_stall(&mut self, now: Timestamp) -> StallCheck {
        let Some(flight) = self.current.as_mut() else {
            return StallCheck::Healthy;
        };
        let age = now.saturating_sub(flight.started);
        if age < flight.next_report {
            return StallCheck::Healthy;
        }

        flight.next_report = flight.next_report.saturating_mul(2);
        if flight.next_report > STALL_ABORT_MS {
            let error = io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no response after {age} ms"),
            );
            self.finish(now, Some(error));
            return StallCheck::Aborted { age };
        }

        tracing::warn!(
            "bridge {}: command {} pending for {} ms while {:?}, {} of {} bytes unsent",
            self.bridge.addr,
            flight.value,
            age,
            self.state,
            flight.request.len() - flight.written,
            flight.request.len()
        );
        StallCheck::Reported { age }
    }

    fn poll_connecting(&mut self) -> io::Result<Step> {
        if self.link.poll_connect()? {
            tracing::trace!("bridge {}: connected", self.bridge.addr);
            self.state = DispatcherState::Sending;
            Ok(Step::Continue)
        } else {
            Ok(Step::Blocked)
        }
    }

    fn poll_sending(&mut self) -> io::Result<Step> {
        let Some(flight) = self.current.as_mut() else {
            return Ok(Step::Complete);
        };
        let n = self.link.write(&flight.request[flight.written..])?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        flight.written += n;
        if flight.written == flight.request.len() {
            tracing::trace!("bridge {}: request written", self.bridge.addr);
            self.state = DispatcherState::Receiving;
        }
        Ok(Step::Continue)
    }

    fn poll_receiving(&mut self) -> io::Result<Step> {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        let n = self.link.read(&mut buf)?;
        if n == 0 {
            return Ok(Step::Complete);
        }
        if let Some(flight) = self.current.as_mut() {
            if flight.status.is_none() {
                flight.status = request::status_code(&buf[..n]);
            }
        }
        tracing::trace!("bridge {}: received {} response bytes", self.bridge.addr, n);
        Ok(Step::Continue)
    }

    fn finish(&mut self, now: Timestamp, error: Option<io::Error>) {
        self.link.close();
        self.state = DispatcherState::Idle;

        if let Some(flight) = self.current.take() {
            let elapsed = now.saturating_sub(flight.started);
            match (error, flight.status) {
                (Some(e), _) => {
                    self.stats.failed += 1;
                    tracing::warn!(
                        "bridge {}: sending {} failed: {}",
                        self.bridge.addr,
                        flight.value,
                        e
                    );
                }
                (None, Some(status)) if (200..300).contains(&status) => {
                    self.stats.delivered += 1;
                    tracing::debug!(
                        "bridge {}: {} delivered in {} ms",
                        self.bridge.addr,
                        flight.value,
                        elapsed
                    );
                }
                (None, Some(status)) => {
                    self.stats.failed += 1;
                    tracing::warn!(
                        "bridge {}: {} rejected with HTTP status {}",
                        self.bridge.addr,
                        flight.value,
                        status
                    );
                }
                (None, None) => {
                    self.stats.failed += 1;
                    tracing::warn!(
                        "bridge {}: no HTTP response to {}",
                        self.bridge.addr,
                        flight.value
                    );
                }
            }
        }

        self.start_next(now);
    }

    /// Starts the next fresh command, discarding stale ones.
    fn start_next(&mut self, now: Timestamp) {
        while let Some(command) = self.take_fresh(now) {
            let request = request::build(&self.bridge, command.value);
            tracing::debug!(
                "bridge {}: sending {} ({} bytes)",
                self.bridge.addr,
                command.value,
                request.len()
            );
            self.current = Some(InFlight {
                value: command.value,
                request,
                written: 0,
                started: now,
                next_report: STALL_REPORT_MS,
                status: None,
            });

            match self.link.connect() {
                Ok(true) => {
                    self.state = DispatcherState::Sending;
                    return;
                }
                Ok(false) => {
                    self.state = DispatcherState::Connecting;
                    return;
                }
                Err(e) => {
                    self.link.close();
                    self.current = None;
                    self.stats.failed += 1;
                    tracing::warn!(
                        "bridge {}: cannot connect to {}: {}",
                        self.bridge.addr,
                        self.bridge.socket_addr(),
                        e
                    );
                }
            }
        }
    }

    /// Pops commands until one young enough is found.
    ///
    /// Everything older than the returned command is dropped with it, so an
    /// empty queue after `None` means all commands were stale.
    fn take_fresh(&mut self, now: Timestamp) -> Option<PendingCommand> {
        while let Some(command) = self.queue.pop_front() {
            match now.checked_sub(command.timestamp) {
                Some(age) if age <= MAX_EVENT_AGE_MS => return Some(command),
                age => {
                    self.stats.dropped += 1;
                    tracing::debug!(
                        "bridge {}: dropping stale command {} (age {:?} ms)",
                        self.bridge.addr,
                        command.value,
                        age
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn bridge() -> BridgeConfig {
        BridgeConfig::new(Ipv4Addr::new(192, 168, 1, 128), "secret", 36)
    }

    fn dispatcher(link: MemoryLink) -> Dispatcher<MemoryLink> {
        Dispatcher::new(bridge(), link)
    }

    #[test]
    fn test_post_when_idle_sends_immediately() {
        let mut d = dispatcher(MemoryLink::new());
        d.post(10, 0);

        assert!(d.is_idle());
        assert_eq!(d.link().requests(), &[request::build(&bridge(), 10)]);
        assert_eq!(d.link().posted_values(), vec![10]);
        assert_eq!(d.stats().delivered, 1);
        assert!(!d.link().is_connected());
    }

    #[test]
    fn test_queue_keeps_latest_commands() {
        let mut d = dispatcher(MemoryLink::new().deferred_connect());
        d.post(1, 0);
        assert_eq!(d.state(), DispatcherState::Connecting);

        for value in 2..=6 {
            d.post(value, 0);
        }
        let queued: Vec<i32> = d.queued().map(|c| c.value).collect();
        assert_eq!(queued, vec![3, 4, 5, 6]);
        assert_eq!(d.stats().dropped, 1);

        while !d.is_idle() {
            d.link_mut().complete_connect();
            d.poll(10);
        }
        assert_eq!(d.link().posted_values(), vec![1, 3, 4, 5, 6]);
        assert_eq!(d.link().connects(), 5);
    }

    #[test]
    fn test_stale_commands_are_skipped() {
        let mut d = dispatcher(MemoryLink::new());
        d.link_mut().set_writable(false);
        d.post(0, 0);
        assert_eq!(d.state(), DispatcherState::Sending);

        d.post(1, 0);
        d.post(2, 100);
        d.post(3, 700);

        d.link_mut().set_writable(true);
        d.poll(1000);
        assert_eq!(d.link().posted_values(), vec![0, 3]);
        assert_eq!(d.stats().dropped, 2);
        assert_eq!(d.queue_len(), 0);
    }

    #[test]
    fn test_all_stale_clears_queue() {
        let mut d = dispatcher(MemoryLink::new());
        d.link_mut().set_writable(false);
        d.post(0, 0);
        d.post(1, 10);
        d.post(2, 20);

        d.link_mut().set_writable(true);
        d.poll(2000);
        assert!(d.is_idle());
        assert_eq!(d.queue_len(), 0);
        assert_eq!(d.link().posted_values(), vec![0]);
    }

    #[test]
    fn test_command_from_the_future_is_stale() {
        let mut d = dispatcher(MemoryLink::new());
        d.post(1, 100);
        d.link_mut().set_writable(false);
        d.post(2, 100);
        d.post(3, 600);
        d.post(4, 150);

        d.link_mut().set_writable(true);
        d.poll(200);
        // 3 carries a timestamp ahead of the clock
        assert_eq!(d.link().posted_values(), vec![1, 2, 4]);
    }

    #[test]
    fn test_partial_writes() {
        let mut d = dispatcher(MemoryLink::new().write_chunk(7));
        d.post(-101, 0);
        assert_eq!(d.link().requests(), &[request::build(&bridge(), -101)]);
        assert_eq!(d.stats().delivered, 1);
    }

    #[test]
    fn test_blocked_write_keeps_request() {
        let mut d = dispatcher(MemoryLink::new());
        d.link_mut().set_writable(false);
        d.post(5, 0);

        let total = request::build(&bridge(), 5).len();
        assert_eq!(d.state(), DispatcherState::Sending);
        assert_eq!(d.bytes_outstanding(), Some(total));
        assert_eq!(d.request_age(250), Some(250));

        d.poll(300);
        assert_eq!(d.bytes_outstanding(), Some(total));

        d.link_mut().set_writable(true);
        d.link_mut().set_readable(false);
        d.poll(300);
        assert_eq!(d.state(), DispatcherState::Receiving);
        assert_eq!(d.bytes_outstanding(), Some(0));

        d.link_mut().set_readable(true);
        d.poll(300);
        assert!(d.is_idle());
        assert_eq!(d.bytes_outstanding(), None);
        assert_eq!(d.request_age(300), None);
    }

    #[test]
    fn test_error_finishes_request_without_retry() {
        let mut d = dispatcher(MemoryLink::new());
        d.link_mut().set_writable(false);
        d.post(1, 0);
        d.post(2, 0);

        d.link_mut().fail_writes(Some(io::ErrorKind::ConnectionReset));
        d.poll(10);
        assert!(d.is_idle());
        assert_eq!(d.stats().failed, 2);
        assert_eq!(d.link().connects(), 2);

        d.link_mut().fail_writes(None);
        d.link_mut().set_writable(true);
        d.post(3, 20);
        assert_eq!(d.link().posted_values(), vec![3]);
    }

    #[test]
    fn test_refused_connection() {
        let mut d = dispatcher(MemoryLink::new().refuse_connect());
        d.post(1, 0);
        assert!(d.is_idle());
        assert_eq!(d.stats().failed, 1);
        assert!(d.link().requests().is_empty());
    }

    #[test]
    fn test_rejected_status() {
        let mut d = dispatcher(
            MemoryLink::new().response(Bytes::from_static(b"HTTP/1.1 403 Forbidden\r\n\r\n")),
        );
        d.post(1, 0);
        assert_eq!(d.stats().failed, 1);
        assert_eq!(d.stats().delivered, 0);

        let mut d = dispatcher(MemoryLink::new().response(Bytes::new()));
        d.post(1, 0);
        assert_eq!(d.stats().failed, 1);
    }

    #[test]
    fn test_stall_watchdog() {
        let mut d = dispatcher(MemoryLink::new().deferred_connect());
        assert_eq!(d.check_stall(0), StallCheck::Healthy);

        d.post(1, 0);
        d.post(2, 7600);
        assert_eq!(d.check_stall(499), StallCheck::Healthy);
        assert_eq!(d.check_stall(500), StallCheck::Reported { age: 500 });
        assert_eq!(d.check_stall(999), StallCheck::Healthy);
        assert_eq!(d.check_stall(1000), StallCheck::Reported { age: 1000 });
        assert_eq!(d.check_stall(2000), StallCheck::Reported { age: 2000 });
        assert_eq!(d.check_stall(4000), StallCheck::Reported { age: 4000 });
        assert_eq!(d.check_stall(7999), StallCheck::Healthy);
        assert_eq!(d.check_stall(8000), StallCheck::Aborted { age: 8000 });

        // The queued command is still fresh and takes over
        assert_eq!(d.state(), DispatcherState::Connecting);
        assert_eq!(d.request_age(8000), Some(0));
        assert_eq!(d.stats().failed, 1);
        assert_eq!(d.link().connects(), 2);
    }
}
