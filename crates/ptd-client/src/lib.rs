//! Client dispatcher for ptdispatch.
//!
//! Binds one local TCP listener per configured transport. Every connection
//! accepted on a listener is carried to the configured target through that
//! transport, optionally via an upstream SOCKS5 or HTTP CONNECT proxy, and
//! relayed until both sides close.

pub mod cli;
mod dispatcher;
mod error;
mod handler;

pub use cli::ClientArgs;
pub use dispatcher::{
    AcceptLoopExit, ClientDispatcher, ClientListener, ClientListeners, ClientSetup,
    start_client_listeners,
};
pub use error::ClientError;

use std::sync::Arc;

use ptd_config::{Config, ConfigError};
use ptd_transport::{SocketOptions, TransportRegistry};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the client with the given configuration until `shutdown` fires.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ClientError> {
    let client = config
        .client
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("missing [client] section".into()))?;
    let setup = ClientSetup::from_config(client, &config.timeouts)?;

    let registry = TransportRegistry::builtin().with_socket_options(SocketOptions {
        backlog: config.timeouts.connection_backlog,
        no_delay: config.timeouts.tcp_no_delay,
    });
    let listeners = start_client_listeners(setup, Arc::new(registry), shutdown.clone());
    if listeners.launched() == 0 {
        return Err(ClientError::NoListeners);
    }
    info!(
        version = ptd_core::VERSION,
        launched = listeners.launched(),
        "client started"
    );

    shutdown.cancelled().await;
    info!("shutting down client");
    listeners.shutdown(config.timeouts.shutdown_timeout()).await;
    info!("client stopped");
    Ok(())
}
