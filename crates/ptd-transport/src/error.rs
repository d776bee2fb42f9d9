//! Error types for the transport crate.

use std::fmt;
use std::time::Duration;

use ptd_config::OptionsError;
use ptd_core::errors::{
    ERROR_CONFIG, ERROR_HANDSHAKE, ERROR_IO, ERROR_PROXY, ERROR_TIMEOUT, ERROR_TRANSPORT,
};
use thiserror::Error;

/// Errors that can occur in transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("certificate generation failed: {0}")]
    CertGeneration(String),

    #[error("unsupported transport `{0}`")]
    Unsupported(String),

    #[error("transport `{transport}` requires option `{key}`")]
    MissingArgument { transport: String, key: String },

    #[error("options: {0}")]
    Options(OptionsError),

    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

impl TransportError {
    /// Get the error type string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            TransportError::Io(_) => ERROR_IO,
            TransportError::Tls(_) | TransportError::Handshake(_) => ERROR_HANDSHAKE,
            TransportError::Config(_)
            | TransportError::CertGeneration(_)
            | TransportError::Options(_) => ERROR_CONFIG,
            TransportError::Unsupported(_) | TransportError::MissingArgument { .. } => {
                ERROR_TRANSPORT
            }
            TransportError::Proxy(_) => ERROR_PROXY,
            TransportError::Timeout(..) => ERROR_TIMEOUT,
        }
    }

    pub(crate) fn handshake(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TransportError::Handshake(std::io::Error::other(err))
    }
}

impl From<OptionsError> for TransportError {
    fn from(e: OptionsError) -> Self {
        match e {
            OptionsError::MissingArgument { transport, key } => {
                TransportError::MissingArgument { transport, key }
            }
            other => TransportError::Options(other),
        }
    }
}

/// Upstream proxy negotiation errors.
#[derive(Debug)]
pub enum ProxyError {
    UnsupportedScheme(String),
    MissingHost,
    InvalidTarget(String),
    InvalidVersion(u8),
    NoAcceptableMethods,
    AuthRequired,
    AuthRejected,
    Reply(u8),
    UnsupportedAddressType(u8),
    HostTooLong(usize),
    HttpStatus(String),
    HttpResponseTooLarge,
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedScheme(s) => write!(f, "unsupported proxy scheme: {s}"),
            Self::MissingHost => write!(f, "proxy URL has no host"),
            Self::InvalidTarget(t) => write!(f, "invalid target address: {t}"),
            Self::InvalidVersion(v) => write!(f, "invalid SOCKS version: 0x{v:02x}"),
            Self::NoAcceptableMethods => write!(f, "no acceptable authentication methods"),
            Self::AuthRequired => write!(f, "proxy requires authentication"),
            Self::AuthRejected => write!(f, "proxy rejected credentials"),
            Self::Reply(code) => write!(f, "SOCKS5 connect failed: {}", socks5_reply_text(*code)),
            Self::UnsupportedAddressType(a) => write!(f, "unsupported address type: 0x{a:02x}"),
            Self::HostTooLong(len) => write!(f, "target host too long ({len} bytes)"),
            Self::HttpStatus(line) => write!(f, "HTTP CONNECT failed: {line}"),
            Self::HttpResponseTooLarge => write!(f, "HTTP CONNECT response headers too large"),
        }
    }
}

impl std::error::Error for ProxyError {}

fn socks5_reply_text(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}
