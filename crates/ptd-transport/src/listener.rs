//! TCP-backed listeners for server transports.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::accept::AcceptError;
use crate::error::TransportError;
use crate::registry::SocketOptions;
use crate::{BoxFuture, BoxedConnection, Incoming, Listener, ServerTransport};

/// Wraps an accepted TCP stream in a transport's server-side handshake.
///
/// The returned future owns everything it needs so it can be awaited by the
/// connection task rather than the accept loop.
pub trait TransportAcceptor: Clone + Send + Sync + 'static {
    fn accept(&self, tcp: TcpStream) -> BoxFuture<'static, Result<BoxedConnection, TransportError>>;
}

/// Create a TCP listener with custom backlog.
pub fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    TcpListener::from_std(std::net::TcpListener::from(socket))
}

/// A bound TCP listener whose connections go through `A`.
pub struct TcpTransportListener<A> {
    listener: TcpListener,
    acceptor: A,
    no_delay: bool,
}

impl<A: TransportAcceptor> TcpTransportListener<A> {
    pub fn new(listener: TcpListener, acceptor: A, no_delay: bool) -> Self {
        Self {
            listener,
            acceptor,
            no_delay,
        }
    }

    pub fn bind(addr: SocketAddr, acceptor: A, socket: SocketOptions) -> io::Result<Self> {
        let listener = create_listener(addr, socket.backlog)?;
        Ok(Self::new(listener, acceptor, socket.no_delay))
    }
}

impl<A: TransportAcceptor> Listener for TcpTransportListener<A> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn accept(&mut self) -> BoxFuture<'_, Result<Incoming, AcceptError>> {
        Box::pin(async move {
            let (tcp, peer) = self.listener.accept().await.map_err(AcceptError::classify)?;
            if self.no_delay
                && let Err(e) = tcp.set_nodelay(true)
            {
                debug!(%peer, error = %e, "failed to set TCP_NODELAY");
            }
            Ok(Incoming::pending(peer, self.acceptor.accept(tcp)))
        })
    }
}

/// Server role shared by the TCP-based transports.
pub struct TcpServerTransport<A> {
    name: String,
    acceptor: A,
    socket: SocketOptions,
}

impl<A: TransportAcceptor> TcpServerTransport<A> {
    pub fn new(name: impl Into<String>, acceptor: A, socket: SocketOptions) -> Self {
        Self {
            name: name.into(),
            acceptor,
            socket,
        }
    }
}

impl<A: TransportAcceptor> ServerTransport for TcpServerTransport<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, addr: SocketAddr) -> BoxFuture<'_, Result<Box<dyn Listener>, TransportError>> {
        Box::pin(async move {
            let listener = TcpTransportListener::bind(addr, self.acceptor.clone(), self.socket)?;
            Ok(Box::new(listener) as Box<dyn Listener>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plain::PlainTransportAcceptor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listener_defers_handshake() {
        let mut listener = TcpTransportListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            PlainTransportAcceptor,
            SocketOptions::default(),
        )
        .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
            stream
        });

        let incoming = listener.accept().await.unwrap();
        let _client = client.await.unwrap();
        assert!(incoming.peer().ip().is_loopback());

        let mut conn = incoming.establish().await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let first = create_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = first.local_addr().unwrap();
        // SO_REUSEADDR does not allow two live listeners on one port.
        assert!(create_listener(addr, 16).is_err());
    }
}
