//! Core types and constants shared across ptdispatch crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error type constants for logging
//! - The bidirectional relay engine and connection tracking
//! - Shutdown signal handling for the binaries
//! - A WebSocket stream adapter used by the `ws` transport

pub mod defaults;
pub mod errors;
pub mod io;
pub mod signal;
pub mod transport;

// Re-export commonly used items at crate root
pub use defaults::*;
pub use errors::*;

/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
