//! Error type constants for logging.
//!
//! These constants provide consistent error classification across all crates.
//! They are attached as the `kind` field of the log line that ends a
//! connection or listener.

/// Configuration or options error.
pub const ERROR_CONFIG: &str = "config";
/// Unknown transport name or missing transport argument.
pub const ERROR_TRANSPORT: &str = "transport";
/// Transport handshake error.
pub const ERROR_HANDSHAKE: &str = "handshake";
/// Upstream proxy negotiation error.
pub const ERROR_PROXY: &str = "proxy";
/// Outbound dial / upstream connect error.
pub const ERROR_DIAL: &str = "dial";
/// No upstream route for a transport.
pub const ERROR_ROUTE: &str = "route";
/// I/O error.
pub const ERROR_IO: &str = "io";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
