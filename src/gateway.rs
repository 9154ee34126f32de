//! The gateway event loop.
//!
//! A single task owns everything: the packet decoder for the serial source,
//! the repeater connections, the [`Router`] and one [`Dispatcher`] per
//! bridge. Each wakeup handles whatever became ready, drains the serial
//! source as far as it goes without blocking and then lets every dispatcher
//! advance.

use std::net::SocketAddr;
use std::time::Duration;

use futures::FutureExt;
use futures::future::select_all;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;

use crate::clock::MonotonicClock;
use crate::config::{BridgeConfig, GatewayConfig};
use crate::dispatch::{Dispatcher, StallCheck, TcpLink};
use crate::error::{Error, Result};
use crate::mapping::CommandMapper;
use crate::protocol::{Packet, PacketDecoder};
use crate::router::Router;
use crate::transport::Repeater;

/// How often stalled requests are checked for.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(250);

const READ_BUFFER_SIZE: usize = 512;

enum Wake {
    Source(std::io::Result<usize>),
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Repeater(usize),
    Dispatch,
    Watchdog,
}

/// EnOcean to Hue gateway.
#[derive(Debug)]
pub struct Gateway {
    router: Router,
    dispatchers: Vec<Dispatcher<TcpLink>>,
    repeaters: Vec<Repeater>,
    clock: MonotonicClock,
}

impl Gateway {
    /// Creates a gateway posting to `bridges`, numbered from 1 in order.
    #[must_use]
    pub fn new(mapper: CommandMapper, bridges: impl IntoIterator<Item = BridgeConfig>) -> Self {
        let dispatchers = bridges
            .into_iter()
            .map(|bridge| {
                tracing::info!(
                    "bridge {}: sensor {} at {}{}",
                    bridge.addr,
                    bridge.sensor_id,
                    bridge.socket_addr(),
                    bridge
                        .group
                        .map(|g| format!(", group {g}"))
                        .unwrap_or_default()
                );
                let link = TcpLink::new(bridge.socket_addr());
                Dispatcher::new(bridge, link)
            })
            .collect();

        Self {
            router: Router::new(mapper),
            dispatchers,
            repeaters: Vec::new(),
            clock: MonotonicClock::new(),
        }
    }

    /// Loads the mapping rules and creates the gateway.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut mapper = CommandMapper::new();
        mapper.load_file(&config.rules)?;
        if config.bridges.is_empty() {
            tracing::warn!("no bridges configured, telegrams will only be logged");
        }
        Ok(Self::new(mapper, config.bridges.iter().cloned()))
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the router mutably.
    pub const fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Returns the dispatchers, in bridge order.
    #[must_use]
    pub fn dispatchers(&self) -> &[Dispatcher<TcpLink>] {
        &self.dispatchers
    }

    /// Returns the number of connected repeaters.
    #[must_use]
    pub fn repeater_count(&self) -> usize {
        self.repeaters.len()
    }

    /// Runs until the source ends or fails.
    ///
    /// `source` yields the raw ESP3 byte stream, normally a serial port.
    /// Repeaters are accepted on `listener` if given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceClosed`] at the end of `source` and
    /// [`Error::Io`] if reading it fails.
    pub async fn run<S>(&mut self, mut source: S, listener: Option<TcpListener>) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        if let Some(listener) = &listener {
            tracing::info!("accepting repeaters on {}", listener.local_addr()?);
        }

        let mut decoder = PacketDecoder::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                biased;
                read = source.read(&mut buf) => Wake::Source(read),
                accepted = accept(listener.as_ref()) => Wake::Accepted(accepted),
                index = repeater_readable(&self.repeaters) => Wake::Repeater(index),
                () = dispatchers_ready(&mut self.dispatchers) => Wake::Dispatch,
                _ = watchdog.tick() => Wake::Watchdog,
            };

            let mut source_closed = false;
            match wake {
                Wake::Source(mut read) => loop {
                    match read {
                        Ok(0) => {
                            source_closed = true;
                            break;
                        }
                        Ok(n) => {
                            tracing::trace!("received {}", hex::encode(&buf[..n]));
                            decoder.feed(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::error!("telegram source read error: {}", e);
                            return Err(Error::Io(e));
                        }
                    }
                    match source.read(&mut buf).now_or_never() {
                        Some(next) => read = next,
                        None => break,
                    }
                },
                Wake::Accepted(Ok((stream, peer))) => {
                    tracing::info!("repeater {} connected", peer);
                    self.repeaters.push(Repeater::new(stream, peer));
                }
                Wake::Accepted(Err(e)) => tracing::warn!("accepting repeater failed: {}", e),
                Wake::Repeater(index) => self.read_repeater(index),
                Wake::Dispatch => {}
                Wake::Watchdog => self.check_stalls(),
            }

            let now = self.clock.now();
            while let Some(packet) = decoder.decode() {
                self.route(&packet);
            }
            for dispatcher in &mut self.dispatchers {
                dispatcher.poll(now);
            }

            if source_closed {
                tracing::warn!("telegram source closed");
                return Err(Error::SourceClosed);
            }
        }
    }

    fn route(&mut self, packet: &Packet) {
        let now = self.clock.now();
        self.router.handle_packet(packet, now, &mut self.dispatchers);
    }

    fn read_repeater(&mut self, index: usize) {
        let Some(repeater) = self.repeaters.get_mut(index) else {
            return;
        };
        let peer = repeater.peer();
        match repeater.read_packets() {
            Ok(Some(packets)) => {
                for packet in &packets {
                    self.route(packet);
                }
            }
            Ok(None) => {
                tracing::info!("repeater {} disconnected", peer);
                self.repeaters.swap_remove(index);
            }
            Err(e) => {
                tracing::warn!("repeater {} dropped: {}", peer, e);
                self.repeaters.swap_remove(index);
            }
        }
    }

    fn check_stalls(&mut self) {
        let now = self.clock.now();
        for dispatcher in &mut self.dispatchers {
            if let StallCheck::Aborted { age } = dispatcher.check_stall(now) {
                tracing::error!(
                    "bridge {}: gave up on request after {} ms",
                    dispatcher.bridge().addr,
                    age
                );
            }
        }
    }
}

async fn accept(listener: Option<&TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn repeater_readable(repeaters: &[Repeater]) -> usize {
    if repeaters.is_empty() {
        return std::future::pending().await;
    }
    let (_, index, _) = select_all(repeaters.iter().map(|r| Box::pin(r.readable()))).await;
    index
}

async fn dispatchers_ready(dispatchers: &mut [Dispatcher<TcpLink>]) {
    let busy: Vec<_> = dispatchers
        .iter_mut()
        .filter(|d| !d.is_idle())
        .map(|d| Box::pin(d.ready()))
        .collect();
    if busy.is_empty() {
        return std::future::pending().await;
    }
    select_all(busy).await;
}
