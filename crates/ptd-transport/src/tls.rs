//! TLS transport implementation.
//!
//! - `TlsTransportAcceptor`: TLS server with a file-based or persisted
//!   self-signed certificate.
//! - `TlsTransportConnector`: TLS client over the dialed stream with a
//!   mandatory SNI.
//!
//! Client arguments: `sni` (required), `skip_verify`, `ca`.
//! Server arguments: `cert` and `key`, both or neither.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use ptd_config::TransportArgs;

use crate::error::TransportError;
use crate::listener::{TcpServerTransport, TransportAcceptor};
use crate::outbound::{DialingTransport, TransportConnector};
use crate::registry::{ClientParams, ServerParams, TransportFactory};
use crate::tls_config::{TlsIdentity, build_client_config, build_server_config};
use crate::{BoxFuture, BoxedConnection, ClientTransport, ServerTransport};

pub const NAME: &str = "tls";

// ── TLS Acceptor ──

/// TLS transport acceptor that wraps incoming TCP connections in TLS.
#[derive(Clone)]
pub struct TlsTransportAcceptor {
    acceptor: TlsAcceptor,
}

impl TlsTransportAcceptor {
    pub fn new(identity: TlsIdentity) -> Result<Self, TransportError> {
        let server_config = build_server_config(identity)?;
        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
        })
    }

    /// Build from `cert`/`key` arguments, falling back to the identity
    /// kept under `statedir`.
    pub fn from_args(args: &TransportArgs, statedir: &Path) -> Result<Self, TransportError> {
        let identity = match (args.optional_str("cert")?, args.optional_str("key")?) {
            (Some(cert), Some(key)) => TlsIdentity::from_files(Path::new(&cert), Path::new(&key))?,
            (None, None) => TlsIdentity::load_or_generate(statedir)?,
            (Some(_), None) => return Err(missing(args, "key")),
            (None, Some(_)) => return Err(missing(args, "cert")),
        };
        Self::new(identity)
    }
}

impl TransportAcceptor for TlsTransportAcceptor {
    fn accept(&self, tcp: TcpStream) -> BoxFuture<'static, Result<BoxedConnection, TransportError>> {
        let acceptor = self.acceptor.clone();
        Box::pin(async move {
            let tls = acceptor.accept(tcp).await.map_err(TransportError::Handshake)?;
            Ok(Box::new(tls) as BoxedConnection)
        })
    }
}

// ── TLS Connector ──

/// TLS transport connector for outbound connections.
#[derive(Clone)]
pub struct TlsTransportConnector {
    client_config: Arc<rustls::ClientConfig>,
    /// SNI value to send in the TLS ClientHello.
    server_name: ServerName<'static>,
}

impl TlsTransportConnector {
    pub fn new(client_config: rustls::ClientConfig, sni: String) -> Result<Self, TransportError> {
        let server_name = ServerName::try_from(sni)
            .map_err(|e| TransportError::Config(format!("invalid SNI: {e}")))?;
        Ok(Self {
            client_config: Arc::new(client_config),
            server_name,
        })
    }

    pub fn from_args(args: &TransportArgs) -> Result<Self, TransportError> {
        let sni = args.require_str("sni")?;
        let skip_verify = args.optional_bool("skip_verify")?.unwrap_or(false);
        let ca = args.optional_str("ca")?;
        let client_config = build_client_config(ca.as_deref().map(Path::new), skip_verify)?;
        Self::new(client_config, sni)
    }
}

impl TransportConnector for TlsTransportConnector {
    fn connect(&self, stream: BoxedConnection) -> BoxFuture<'_, Result<BoxedConnection, TransportError>> {
        Box::pin(async move {
            let connector = TlsConnector::from(self.client_config.clone());
            let tls = connector
                .connect(self.server_name.clone(), stream)
                .await
                .map_err(TransportError::Handshake)?;
            Ok(Box::new(tls) as BoxedConnection)
        })
    }
}

/// Factory for the `tls` transport.
#[derive(Debug, Clone, Copy)]
pub struct TlsFactory;

impl TransportFactory for TlsFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn client(&self, params: ClientParams) -> Result<Box<dyn ClientTransport>, TransportError> {
        let connector = TlsTransportConnector::from_args(&params.args)?;
        Ok(Box::new(DialingTransport::new(
            NAME,
            params.target,
            params.dialer,
            connector,
        )))
    }

    fn server(&self, params: ServerParams<'_>) -> Result<Arc<dyn ServerTransport>, TransportError> {
        let acceptor = TlsTransportAcceptor::from_args(&params.args, params.statedir)?;
        Ok(Arc::new(TcpServerTransport::new(NAME, acceptor, params.socket)))
    }
}

fn missing(args: &TransportArgs, key: &str) -> TransportError {
    TransportError::MissingArgument {
        transport: args.transport().to_string(),
        key: key.to_string(),
    }
}
