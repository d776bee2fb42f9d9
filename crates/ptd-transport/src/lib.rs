//! Pluggable transport abstraction for ptdispatch.
//!
//! Defines the capabilities the dispatchers consume without inspecting them:
//! a [`Dialer`] opening raw connections, a [`ClientTransport`] producing
//! transport-wrapped outbound connections, and a [`ServerTransport`] producing
//! [`Listener`]s of transport-wrapped inbound connections. Transports are
//! looked up by name in a [`TransportRegistry`].
//!
//! # Transports
//!
//! - [`plain`]: Plain TCP pass-through (no encryption).
//! - [`tls`]: TLS with persisted self-signed or file-based certificates.
//! - [`ws`]: WebSocket, reusing `ptd_core::transport::WsIo`.

pub mod accept;
pub mod dialer;
pub mod error;
pub mod listener;
pub mod outbound;
pub mod plain;
pub mod registry;
pub mod tls;
pub mod tls_config;
pub mod ws;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

pub use accept::AcceptError;
pub use dialer::{DirectDialer, HttpConnectDialer, ProxyAuth, Socks5Dialer, dialer_from_url};
pub use error::{ProxyError, TransportError};
pub use registry::{
    ClientParams, ServerParams, SocketOptions, TransportFactory, TransportRegistry,
};

/// Boxed future used across the object-safe transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Marker trait for streams usable by the relay.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Connection for T {}

/// An owned, type-erased connection.
pub type BoxedConnection = Box<dyn Connection>;

/// Opens a raw connection to a `host:port` target.
///
/// Client transports run their handshake over whatever the dialer returns,
/// so routing through an upstream proxy is a matter of choosing the dialer.
pub trait Dialer: Send + Sync + 'static {
    fn dial<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<BoxedConnection, TransportError>>;
}

/// Client role of a transport, bound to one target.
pub trait ClientTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Open a transport-wrapped connection to the target.
    fn dial(&self) -> BoxFuture<'_, Result<BoxedConnection, TransportError>>;
}

/// Server role of a transport.
pub trait ServerTransport: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Bind a listener at `addr`.
    fn listen(&self, addr: SocketAddr) -> BoxFuture<'_, Result<Box<dyn Listener>, TransportError>>;
}

/// A bound listener producing inbound transport connections.
pub trait Listener: Send {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Wait for the next inbound connection.
    ///
    /// Only the raw accept happens here; the transport handshake is carried
    /// by the returned [`Incoming`] and completed by its owner.
    fn accept(&mut self) -> BoxFuture<'_, Result<Incoming, AcceptError>>;
}

/// An accepted connection whose transport handshake may still be pending.
pub struct Incoming {
    peer: SocketAddr,
    handshake: BoxFuture<'static, Result<BoxedConnection, TransportError>>,
}

impl Incoming {
    /// A connection that needs no handshake.
    pub fn ready(peer: SocketAddr, conn: BoxedConnection) -> Self {
        Self::pending(peer, async move { Ok(conn) })
    }

    pub fn pending<F>(peer: SocketAddr, handshake: F) -> Self
    where
        F: Future<Output = Result<BoxedConnection, TransportError>> + Send + 'static,
    {
        Self {
            peer,
            handshake: Box::pin(handshake),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Complete the transport handshake.
    pub async fn establish(self) -> Result<BoxedConnection, TransportError> {
        self.handshake.await
    }
}

impl std::fmt::Debug for Incoming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Incoming").field("peer", &self.peer).finish()
    }
}

/// Await `fut`, failing with [`TransportError::Timeout`] once `limit` elapses.
///
/// `None` waits indefinitely.
pub async fn with_timeout<T, F>(
    what: &'static str,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout(what, limit))?,
        None => fut.await,
    }
}
