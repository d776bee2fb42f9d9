//! WebSocket transport implementation.
//!
//! - `WsTransportAcceptor`: performs a WebSocket server handshake on an
//!   accepted TCP connection, optionally restricted to one request path.
//! - `WsTransportConnector`: performs a WebSocket client handshake over the
//!   dialed stream.
//!
//! Both reuse `ptd_core::transport::WsIo` as the byte-stream adapter.
//!
//! Client arguments: `path` (required), `host` (defaults to the target).
//! Server arguments: `path` (optional).

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, client_async};

use ptd_config::TransportArgs;
use ptd_core::transport::WsIo;

use crate::error::TransportError;
use crate::listener::{TcpServerTransport, TransportAcceptor};
use crate::outbound::{DialingTransport, TransportConnector};
use crate::registry::{ClientParams, ServerParams, TransportFactory};
use crate::{BoxFuture, BoxedConnection, ClientTransport, ServerTransport};

pub const NAME: &str = "ws";

/// WebSocket transport acceptor: upgrades incoming TCP to WebSocket.
#[derive(Clone, Debug, Default)]
pub struct WsTransportAcceptor {
    path: Option<Arc<str>>,
}

impl WsTransportAcceptor {
    pub fn new(path: Option<String>) -> Self {
        Self {
            path: path.map(|p| Arc::from(normalize_path(&p))),
        }
    }
}

impl TransportAcceptor for WsTransportAcceptor {
    fn accept(&self, tcp: TcpStream) -> BoxFuture<'static, Result<BoxedConnection, TransportError>> {
        let expected = self.path.clone();
        Box::pin(async move {
            let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                match &expected {
                    Some(path) if req.uri().path() != &**path => {
                        let mut reject = ErrorResponse::new(Some("not found".to_string()));
                        *reject.status_mut() = StatusCode::NOT_FOUND;
                        Err(reject)
                    }
                    _ => Ok(resp),
                }
            };
            let ws_stream = accept_hdr_async(tcp, check_path)
                .await
                .map_err(TransportError::handshake)?;
            Ok(Box::new(WsIo::new(ws_stream)) as BoxedConnection)
        })
    }
}

/// WebSocket transport connector: upgrades the dialed stream to WebSocket.
#[derive(Clone, Debug)]
pub struct WsTransportConnector {
    url: String,
}

impl WsTransportConnector {
    pub fn new(host: &str, path: &str) -> Self {
        Self {
            url: format!("ws://{}{}", host, normalize_path(path)),
        }
    }

    pub fn from_args(args: &TransportArgs, target: &str) -> Result<Self, TransportError> {
        let path = args.require_str("path")?;
        let host = args.optional_str("host")?.unwrap_or_else(|| target.to_string());
        Ok(Self::new(&host, &path))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TransportConnector for WsTransportConnector {
    fn connect(&self, stream: BoxedConnection) -> BoxFuture<'_, Result<BoxedConnection, TransportError>> {
        Box::pin(async move {
            let (ws_stream, _response) = client_async(self.url.as_str(), stream)
                .await
                .map_err(TransportError::handshake)?;
            Ok(Box::new(WsIo::new(ws_stream)) as BoxedConnection)
        })
    }
}

/// Factory for the `ws` transport.
#[derive(Debug, Clone, Copy)]
pub struct WsFactory;

impl TransportFactory for WsFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn client(&self, params: ClientParams) -> Result<Box<dyn ClientTransport>, TransportError> {
        let connector = WsTransportConnector::from_args(&params.args, &params.target)?;
        Ok(Box::new(DialingTransport::new(
            NAME,
            params.target,
            params.dialer,
            connector,
        )))
    }

    fn server(&self, params: ServerParams<'_>) -> Result<Arc<dyn ServerTransport>, TransportError> {
        let acceptor = WsTransportAcceptor::new(params.args.optional_str("path")?);
        Ok(Arc::new(TcpServerTransport::new(NAME, acceptor, params.socket)))
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_url() {
        let args = TransportArgs::new(NAME).with("path", "tunnel");
        let connector = WsTransportConnector::from_args(&args, "203.0.113.7:80").unwrap();
        assert_eq!(connector.url(), "ws://203.0.113.7:80/tunnel");

        let args = args.with("host", "cdn.example.com");
        let connector = WsTransportConnector::from_args(&args, "203.0.113.7:80").unwrap();
        assert_eq!(connector.url(), "ws://cdn.example.com/tunnel");
    }

    #[test]
    fn test_connector_requires_path() {
        let args = TransportArgs::new(NAME);
        assert!(matches!(
            WsTransportConnector::from_args(&args, "127.0.0.1:80"),
            Err(TransportError::MissingArgument { .. })
        ));
    }
}
