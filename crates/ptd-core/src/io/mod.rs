//! I/O utilities for bidirectional relay and connection accounting.
//!
//! This module provides shared I/O primitives used by both the client and
//! the server dispatcher.

mod relay;
mod tracker;

pub use relay::{RelayConfig, RelayError, RelayOutcome, RelayStats, Side, relay};
pub use tracker::{ConnectionGuard, ConnectionTracker};
