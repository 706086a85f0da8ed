use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{Accept, Connection};

/// Pre-bound socket handed to the server through its configuration.
///
/// Clones share the slot; the socket is taken by the first start that finds it.
#[derive(Clone, Default)]
pub struct ListenerSlot(Arc<Mutex<Option<std::net::TcpListener>>>);

impl ListenerSlot {
    /// Wraps a bound std listener.
    pub fn new(listener: std::net::TcpListener) -> Self {
        Self(Arc::new(Mutex::new(Some(listener))))
    }

    /// Returns `true` while the socket has not been taken.
    pub fn is_filled(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn take(&self) -> Option<std::net::TcpListener> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl From<std::net::TcpListener> for ListenerSlot {
    fn from(listener: std::net::TcpListener) -> Self {
        Self::new(listener)
    }
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListenerSlot").field(&self.is_filled()).finish()
    }
}

/// TCP listener with an optional concurrent-connection cap and explicit close.
///
/// ### Rules
/// - With a cap of `n`, `accept` waits for a free slot before accepting; the slot
///   is released when the returned [`Connection`] is dropped.
/// - After [`close`](Self::close), pending and future `accept` calls fail promptly
///   with `NotConnected`. The socket itself is released when the listener drops.
pub struct Listener {
    inner: TcpListener,
    local: SocketAddr,
    limit: Option<Arc<Semaphore>>,
    closed: CancellationToken,
}

impl Listener {
    /// Binds a new listener on `addr`.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Self::from_tokio(TcpListener::bind(addr).await?)
    }

    /// Adopts a bound std listener (switches it to non-blocking mode).
    pub fn from_std(listener: std::net::TcpListener) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Self::from_tokio(TcpListener::from_std(listener)?)
    }

    /// Adopts a bound tokio listener.
    pub fn from_tokio(inner: TcpListener) -> io::Result<Self> {
        let local = inner.local_addr()?;
        Ok(Self {
            inner,
            local,
            limit: None,
            closed: CancellationToken::new(),
        })
    }

    /// Caps concurrent connections; `None` or `Some(0)` means unlimited.
    pub fn with_limit(mut self, max: Option<usize>) -> Self {
        self.limit = max.filter(|n| *n > 0).map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Stops accepting. Fails if the listener was already closed.
    pub fn close(&self) -> io::Result<()> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        self.closed.cancel();
        Ok(())
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Accept for Listener {
    async fn accept(&self) -> io::Result<Connection> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }

        let permit = match &self.limit {
            Some(sem) => tokio::select! {
                res = Arc::clone(sem).acquire_owned() => Some(res.map_err(|_| closed_error())?),
                _ = self.closed.cancelled() => return Err(closed_error()),
            },
            None => None,
        };

        tokio::select! {
            res = self.inner.accept() => {
                let (stream, peer) = res?;
                Ok(Connection::new(stream, peer).with_permit(permit))
            }
            _ = self.closed.cancelled() => Err(closed_error()),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local", &self.local)
            .field("limit", &self.limit.as_ref().map(|s| s.available_permits()))
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "use of closed listener")
}
