//! Transport stream adapters.
//!
//! This module contains adapters that expose framed transports as plain
//! byte streams, so they can be handed to the relay unchanged.

mod ws;

pub use ws::WsIo;
