//! TCP [`Link`] on top of tokio sockets.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::Interest;
use tokio::net::TcpStream;

use super::{Dispatcher, DispatcherState, Link};

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

enum TcpState {
    Closed,
    Connecting(ConnectFuture),
    Failed(io::Error),
    Open(TcpStream),
}

/// Non-blocking TCP connection to a bridge.
///
/// Must be used from within a tokio runtime. Readiness is awaited through
/// [`Dispatcher::ready`].
pub struct TcpLink {
    addr: SocketAddr,
    state: TcpState,
}

impl TcpLink {
    /// Creates a closed link to `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: TcpState::Closed,
        }
    }

    /// Returns the remote address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits until the link can make progress in the direction of `interest`.
    ///
    /// A connection in progress is driven to completion. Cancel safe.
    pub async fn ready(&mut self, interest: Interest) {
        match &mut self.state {
            TcpState::Connecting(connecting) => {
                self.state = match connecting.as_mut().await {
                    Ok(stream) => TcpState::Open(stream),
                    Err(e) => TcpState::Failed(e),
                };
            }
            TcpState::Open(stream) => {
                if let Err(e) = stream.ready(interest).await {
                    tracing::debug!("{}: readiness error: {}", self.addr, e);
                }
            }
            TcpState::Failed(_) => {}
            TcpState::Closed => std::future::pending().await,
        }
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        match &self.state {
            TcpState::Open(stream) => Ok(stream),
            _ => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

impl Link for TcpLink {
    fn connect(&mut self) -> io::Result<bool> {
        let addr = self.addr;
        tracing::trace!("connecting to {}", addr);
        self.state = TcpState::Connecting(Box::pin(TcpStream::connect(addr)));
        self.poll_connect()
    }

    fn poll_connect(&mut self) -> io::Result<bool> {
        match std::mem::replace(&mut self.state, TcpState::Closed) {
            TcpState::Connecting(mut connecting) => {
                let mut cx = Context::from_waker(futures::task::noop_waker_ref());
                match connecting.as_mut().poll(&mut cx) {
                    Poll::Ready(Ok(stream)) => {
                        self.state = TcpState::Open(stream);
                        Ok(true)
                    }
                    Poll::Ready(Err(e)) => Err(e),
                    Poll::Pending => {
                        self.state = TcpState::Connecting(connecting);
                        Ok(false)
                    }
                }
            }
            TcpState::Open(stream) => {
                self.state = TcpState::Open(stream);
                Ok(true)
            }
            TcpState::Failed(e) => Err(e),
            TcpState::Closed => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.try_write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.try_read(buf)
    }

    fn close(&mut self) {
        self.state = TcpState::Closed;
    }
}

impl fmt::Debug for TcpLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            TcpState::Closed => "closed",
            TcpState::Connecting(_) => "connecting",
            TcpState::Failed(_) => "failed",
            TcpState::Open(_) => "open",
        };
        f.debug_struct("TcpLink")
            .field("addr", &self.addr)
            .field("state", &state)
            .finish()
    }
}

impl Dispatcher<TcpLink> {
    /// Waits until [`Dispatcher::poll`] can make progress.
    ///
    /// Never completes while idle. Cancel safe.
    pub async fn ready(&mut self) {
        let interest = match self.state() {
            DispatcherState::Idle => return std::future::pending().await,
            DispatcherState::Connecting | DispatcherState::Sending => Interest::WRITABLE,
            DispatcherState::Receiving => Interest::READABLE,
        };
        self.link_mut().ready(interest).await;
    }
}
