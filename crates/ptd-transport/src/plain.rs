//! Plain TCP transport (no encryption).
//!
//! Useful for testing or trusted-network scenarios where the transport
//! only needs to carry bytes (e.g., localhost or an existing tunnel).

use std::sync::Arc;

use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::listener::{TcpServerTransport, TransportAcceptor};
use crate::outbound::{DialingTransport, TransportConnector};
use crate::registry::{ClientParams, ServerParams, TransportFactory};
use crate::{BoxFuture, BoxedConnection, ClientTransport, ServerTransport};

pub const NAME: &str = "plain";

/// Plain TCP acceptor. Passes the raw TCP stream through.
#[derive(Debug, Clone)]
pub struct PlainTransportAcceptor;

impl TransportAcceptor for PlainTransportAcceptor {
    fn accept(&self, tcp: TcpStream) -> BoxFuture<'static, Result<BoxedConnection, TransportError>> {
        Box::pin(async move { Ok(Box::new(tcp) as BoxedConnection) })
    }
}

/// Plain connector. Hands the dialed stream through untouched.
#[derive(Debug, Clone)]
pub struct PlainTransportConnector;

impl TransportConnector for PlainTransportConnector {
    fn connect(&self, stream: BoxedConnection) -> BoxFuture<'_, Result<BoxedConnection, TransportError>> {
        Box::pin(async move { Ok(stream) })
    }
}

/// Factory for the `plain` transport. Takes no arguments.
#[derive(Debug, Clone, Copy)]
pub struct PlainFactory;

impl TransportFactory for PlainFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn client(&self, params: ClientParams) -> Result<Box<dyn ClientTransport>, TransportError> {
        Ok(Box::new(DialingTransport::new(
            NAME,
            params.target,
            params.dialer,
            PlainTransportConnector,
        )))
    }

    fn server(&self, params: ServerParams<'_>) -> Result<Arc<dyn ServerTransport>, TransportError> {
        Ok(Arc::new(TcpServerTransport::new(
            NAME,
            PlainTransportAcceptor,
            params.socket,
        )))
    }
}
