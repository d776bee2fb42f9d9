//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `ptd_core::defaults`.

use ptd_core::defaults;

/// Generate default value functions that forward to ptd_core::defaults constants.
macro_rules! default_fns {
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

default_fns! {
    default_dial_timeout_secs      => DEFAULT_DIAL_TIMEOUT_SECS: u64,
    default_handshake_timeout_secs => DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64,
    default_idle_timeout_secs      => DEFAULT_IDLE_TIMEOUT_SECS: u64,
    default_shutdown_timeout_secs  => DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64,
    default_rebind_delay_ms        => DEFAULT_REBIND_DELAY_MS: u64,
    default_relay_buffer_size      => DEFAULT_RELAY_BUFFER_SIZE: usize,
    default_connection_backlog     => DEFAULT_CONNECTION_BACKLOG: u32,
    default_tcp_no_delay           => DEFAULT_TCP_NO_DELAY: bool,
}

pub(crate) fn default_client_listen() -> String {
    defaults::DEFAULT_CLIENT_LISTEN.to_string()
}
