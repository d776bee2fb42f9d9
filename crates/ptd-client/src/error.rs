//! Client error types.

use ptd_config::{ConfigError, OptionsError};
use ptd_core::errors::{
    ERROR_CONFIG, ERROR_DIAL, ERROR_HANDSHAKE, ERROR_IO, ERROR_PROXY, ERROR_TIMEOUT,
    ERROR_TRANSPORT,
};
use ptd_core::io::RelayError;
use ptd_transport::TransportError;

/// Errors that can occur in the client dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),

    #[error("upstream proxy: {0}")]
    Proxy(#[source] TransportError),

    #[error("transport: {0}")]
    Resolve(#[source] TransportError),

    #[error("dial failed: {0}")]
    Dial(#[source] TransportError),

    #[error("relay: {0}")]
    Relay(#[from] RelayError),

    #[error("no client listener could be started")]
    NoListeners,
}

impl ClientError {
    /// Get the error type string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ClientError::Io(_) => ERROR_IO,
            ClientError::Config(_) | ClientError::Options(_) => ERROR_CONFIG,
            ClientError::Proxy(_) => ERROR_PROXY,
            ClientError::Resolve(e) => e.error_type(),
            ClientError::Dial(e) => match e {
                TransportError::Io(_) => ERROR_DIAL,
                other => other.error_type(),
            },
            ClientError::Relay(RelayError::IdleTimeout(_)) => ERROR_TIMEOUT,
            ClientError::Relay(_) => ERROR_IO,
            ClientError::NoListeners => ERROR_TRANSPORT,
        }
    }
}
