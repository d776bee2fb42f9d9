//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Timeout Defaults
// ============================================================================

/// Default dial timeout in seconds (0 = no timeout).
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 0;
/// Default server-side transport handshake timeout in seconds (0 = no timeout).
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 0;
/// Default relay idle timeout in seconds (0 = no timeout).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 0;
/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
/// Default delay before a server listener is rebound after a failure.
pub const DEFAULT_REBIND_DELAY_MS: u64 = 1000;

// ============================================================================
// Buffer/Size Defaults
// ============================================================================

/// Default relay buffer size per direction (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;

// ============================================================================
// Socket Defaults
// ============================================================================

/// Default TCP_NODELAY for dialed and accepted sockets.
pub const DEFAULT_TCP_NO_DELAY: bool = true;
/// Default TCP listener backlog.
pub const DEFAULT_CONNECTION_BACKLOG: u32 = 1024;

// ============================================================================
// Client Defaults
// ============================================================================

/// Default local address the client listens on.
pub const DEFAULT_CLIENT_LISTEN: &str = "127.0.0.1:1080";
/// Upstream proxy URL schemes the client can dial through.
pub const SUPPORTED_PROXY_SCHEMES: &[&str] = &["socks5", "socks5h", "http"];

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ============================================================================
// Transport Defaults
// ============================================================================

/// Subdirectory of the state directory holding the `tls` transport identity.
pub const TLS_STATE_SUBDIR: &str = "tls";
/// File name of the persisted `tls` certificate.
pub const TLS_STATE_CERT_FILE: &str = "cert.pem";
/// File name of the persisted `tls` private key.
pub const TLS_STATE_KEY_FILE: &str = "key.pem";
/// Subject alternative name written into generated certificates.
pub const TLS_GENERATED_SAN: &str = "ptdispatch.invalid";
