//! # ptdispatch
//!
//! A pluggable transport dispatcher.
//!
//! The client side binds local listeners and carries each accepted
//! connection to a remote target through a named transport. The server side
//! accepts transport connections and relays them to upstream endpoints.
//! Transports are looked up by name, so the dispatchers never depend on any
//! particular one.
//!
//! ## Crates
//!
//! - [`ptd_core`] - Relay engine, connection tracking and defaults
//! - [`ptd_config`] - Configuration, transport options and logging setup
//! - [`ptd_transport`] - Transport traits, registry, dialers and built-ins
//! - [`ptd_client`] - Client dispatcher
//! - [`ptd_server`] - Server dispatcher

pub use ptd_client as client;
pub use ptd_config as config;
pub use ptd_core as core;
pub use ptd_server as server;
pub use ptd_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use ptd_client::{ClientListeners, ClientSetup, start_client_listeners};
    pub use ptd_config::{Config, load_config, parse_options, parse_server_options};
    pub use ptd_core::io::{RelayConfig, RelayError, RelayStats, relay};
    pub use ptd_server::{
        CancellationToken, RoutingTable, ServerListeners, ServerRouting, ServerSetup,
        StaticRouting, start_server_listeners,
    };
    pub use ptd_transport::{TransportFactory, TransportRegistry};
}
