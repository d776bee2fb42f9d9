//! Configuration loading and CLI definitions.
//!
//! Besides the config file model this crate owns the parsing of per-transport
//! options blobs, which both dispatchers consume at runtime.

mod cli;
mod defaults;
mod loader;
mod logging;
pub mod options;
mod types;
mod validate;

pub use cli::{
    ClientOverrides, CommonOverrides, ServerOverrides, apply_client_overrides,
    apply_server_overrides,
};
pub use loader::{ConfigError, load_config};
pub use logging::{filter_directives, init_tracing};
pub use options::{
    OptionsError, TransportArgs, TransportOptions, coerce_to_string, parse_options,
    parse_server_options,
};
pub use types::*;
pub use validate::{validate_client, validate_config, validate_server, validate_timeouts};
