//! Network plumbing for the connection acceptor.
//!
//! - [`Accept`] is the seam the acceptor loop is written against; [`Listener`]
//!   implements it over a tokio `TcpListener`.
//! - [`Connection`] is what a [`Serve`](crate::Serve) implementation receives:
//!   a boxed byte stream plus the peer address. It holds the connection-limit
//!   permit, if any, until it is dropped.
//! - [`ListenerSlot`] carries a pre-bound socket through the (cloneable)
//!   configuration; the first start takes it.

mod listener;
#[cfg(feature = "tls")]
mod tls;

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::OwnedSemaphorePermit;

pub use listener::{Listener, ListenerSlot};
#[cfg(feature = "tls")]
pub(crate) use tls::TlsServe;

/// Byte stream a connection wraps.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Source of inbound connections.
pub trait Accept: Send + Sync + 'static {
    /// Waits for the next connection.
    fn accept(&self) -> impl Future<Output = io::Result<Connection>> + Send;
}

/// One accepted connection.
pub struct Connection {
    stream: Box<dyn Stream>,
    peer: SocketAddr,
    permit: Option<OwnedSemaphorePermit>,
}

impl Connection {
    /// Wraps any byte stream.
    pub fn new(stream: impl Stream, peer: SocketAddr) -> Self {
        Self {
            stream: Box::new(stream),
            peer,
            permit: None,
        }
    }

    pub(crate) fn with_permit(mut self, permit: Option<OwnedSemaphorePermit>) -> Self {
        self.permit = permit;
        self
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    pub(crate) fn into_parts(self) -> (Box<dyn Stream>, SocketAddr, Option<OwnedSemaphorePermit>) {
        (self.stream, self.peer, self.permit)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("limited", &self.permit.is_some())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.stream).poll_shutdown(cx)
    }
}

/// Returns `true` for accept errors worth retrying after a pause.
///
/// Covers aborted/reset handshakes, interrupts, timeouts and descriptor
/// exhaustion (EMFILE / ENFILE).
pub fn is_temporary(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }
    matches!(err.raw_os_error(), Some(23) | Some(24)) && cfg!(unix)
}
