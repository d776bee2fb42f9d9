//! Server error types.

use ptd_config::{ConfigError, OptionsError};
use ptd_core::errors::{
    ERROR_CONFIG, ERROR_DIAL, ERROR_HANDSHAKE, ERROR_IO, ERROR_ROUTE, ERROR_TIMEOUT,
    ERROR_TRANSPORT,
};
use ptd_core::io::RelayError;
use ptd_transport::TransportError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("options: {0}")]
    Options(#[from] OptionsError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("handshake: {0}")]
    Handshake(#[source] TransportError),
    #[error("no upstream route for transport `{0}`")]
    NoRoute(String),
    #[error("upstream {addr}: {source}")]
    Upstream {
        addr: String,
        #[source]
        source: TransportError,
    },
    #[error("relay: {0}")]
    Relay(#[from] RelayError),
    #[error("no server listener could be started")]
    NoListeners,
}

impl ServerError {
    /// Get the error type string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Io(_) => ERROR_IO,
            ServerError::Config(_) | ServerError::Options(_) => ERROR_CONFIG,
            ServerError::Transport(e) => e.error_type(),
            ServerError::Handshake(TransportError::Timeout(..)) => ERROR_TIMEOUT,
            ServerError::Handshake(_) => ERROR_HANDSHAKE,
            ServerError::NoRoute(_) => ERROR_ROUTE,
            ServerError::Upstream {
                source: TransportError::Timeout(..),
                ..
            } => ERROR_TIMEOUT,
            ServerError::Upstream { .. } => ERROR_DIAL,
            ServerError::Relay(RelayError::IdleTimeout(_)) => ERROR_TIMEOUT,
            ServerError::Relay(_) => ERROR_IO,
            ServerError::NoListeners => ERROR_TRANSPORT,
        }
    }
}
