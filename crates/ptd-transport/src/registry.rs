//! Named transport factories.
//!
//! The dispatchers never know which transports exist: they hand a name,
//! the parsed options and a dialer (client) or state directory (server) to
//! the registry and get a ready transport back.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ptd_config::{TransportArgs, TransportOptions};
use ptd_core::defaults::{DEFAULT_CONNECTION_BACKLOG, DEFAULT_TCP_NO_DELAY};

use crate::error::TransportError;
use crate::plain::PlainFactory;
use crate::tls::TlsFactory;
use crate::ws::WsFactory;
use crate::{ClientTransport, Dialer, ServerTransport};

/// Socket tuning applied by listening transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub backlog: u32,
    pub no_delay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_CONNECTION_BACKLOG,
            no_delay: DEFAULT_TCP_NO_DELAY,
        }
    }
}

/// Inputs for building the client role of a transport.
pub struct ClientParams {
    /// Remote `host:port` the transport connects to.
    pub target: String,
    pub args: TransportArgs,
    pub dialer: Arc<dyn Dialer>,
}

/// Inputs for building the server role of a transport.
pub struct ServerParams<'a> {
    /// Directory for persistent transport state; empty means none.
    pub statedir: &'a Path,
    pub args: TransportArgs,
    pub socket: SocketOptions,
}

/// Builds transports of one name.
pub trait TransportFactory: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn client(&self, _params: ClientParams) -> Result<Box<dyn ClientTransport>, TransportError> {
        Err(TransportError::Config(format!(
            "transport `{}` has no client role",
            self.name()
        )))
    }

    fn server(&self, _params: ServerParams<'_>) -> Result<Arc<dyn ServerTransport>, TransportError> {
        Err(TransportError::Config(format!(
            "transport `{}` has no server role",
            self.name()
        )))
    }
}

/// Mapping from transport name to factory.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: BTreeMap<String, Arc<dyn TransportFactory>>,
    socket: SocketOptions,
}

impl TransportRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `plain`, `tls` and `ws` transports.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PlainFactory);
        registry.register(TlsFactory);
        registry.register(WsFactory);
        registry
    }

    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    /// Add a factory under its own name, returning the one it replaces.
    pub fn register(
        &mut self,
        factory: impl TransportFactory,
    ) -> Option<Arc<dyn TransportFactory>> {
        self.factories
            .insert(factory.name().to_string(), Arc::new(factory))
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn factory(&self, name: &str) -> Result<&Arc<dyn TransportFactory>, TransportError> {
        self.factories
            .get(name)
            .ok_or_else(|| TransportError::Unsupported(name.to_string()))
    }

    /// Build the client role of `name` bound to `target`.
    ///
    /// The factory sees only the arguments scoped to `name`.
    pub fn resolve_client(
        &self,
        name: &str,
        target: &str,
        options: &TransportOptions,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Box<dyn ClientTransport>, TransportError> {
        let factory = self.factory(name)?;
        factory.client(ClientParams {
            target: target.to_string(),
            args: options.args_for(name),
            dialer,
        })
    }

    /// Build the server role of `name`.
    pub fn resolve_server(
        &self,
        name: &str,
        statedir: &Path,
        options: &TransportOptions,
    ) -> Result<Arc<dyn ServerTransport>, TransportError> {
        let factory = self.factory(name)?;
        factory.server(ServerParams {
            statedir,
            args: options.args_for(name),
            socket: self.socket,
        })
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.names())
            .field("socket", &self.socket)
            .finish()
    }
}
