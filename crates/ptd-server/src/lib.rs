//! Server dispatcher for ptdispatch.
//!
//! Starts one supervised listener per bind spec. Connections accepted by a
//! transport are relayed to the upstream endpoint chosen by a
//! [`ServerRouting`] for that transport's name.

pub mod cli;
mod error;
mod handler;
mod routing;
mod server;

pub use cli::ServerArgs;
pub use error::ServerError;
pub use routing::{RoutingTable, ServerRouting, StaticRouting};
pub use server::{ServerListener, ServerListeners, ServerSetup, start_server_listeners};
pub use tokio_util::sync::CancellationToken;

use std::sync::Arc;

use ptd_config::{Config, ConfigError};
use ptd_transport::{SocketOptions, TransportRegistry};
use tracing::info;

/// Run the server with the given configuration until `shutdown` fires.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let server = config
        .server
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("missing [server] section".into()))?;
    let setup = ServerSetup::from_config(server, &config.timeouts);
    let routing = Arc::new(RoutingTable::from_settings(server));

    let registry = TransportRegistry::builtin().with_socket_options(SocketOptions {
        backlog: config.timeouts.connection_backlog,
        no_delay: config.timeouts.tcp_no_delay,
    });
    let listeners = start_server_listeners(setup, routing, Arc::new(registry), shutdown.clone());
    if listeners.launched() == 0 {
        return Err(ServerError::NoListeners);
    }
    info!(
        version = ptd_core::VERSION,
        launched = listeners.launched(),
        "server started"
    );

    shutdown.cancelled().await;
    info!("shutting down server");
    listeners.shutdown(config.timeouts.shutdown_timeout()).await;
    info!("server stopped");
    Ok(())
}
