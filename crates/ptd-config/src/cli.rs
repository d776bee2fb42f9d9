//! CLI override definitions and application logic.

use std::path::PathBuf;

use clap::Parser;

use crate::types::*;

/// Overrides shared by the client and server commands.
#[derive(Debug, Clone, Parser, Default)]
pub struct CommonOverrides {
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Override log format (pretty/compact/json)
    #[arg(long)]
    pub log_format: Option<String>,
    /// Override dial timeout in seconds (0 = none)
    #[arg(long)]
    pub dial_timeout_secs: Option<u64>,
    /// Override relay idle timeout in seconds (0 = none)
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
    /// Buffer size for the relay (bytes)
    #[arg(long)]
    pub relay_buffer_size: Option<usize>,
}

#[derive(Debug, Clone, Parser, Default)]
pub struct ClientOverrides {
    /// Override local listen address, e.g. 127.0.0.1:1080
    #[arg(long)]
    pub listen: Option<String>,
    /// Override remote target, e.g. 203.0.113.7:443
    #[arg(long)]
    pub target: Option<String>,
    /// Override transport list (repeatable or comma-separated)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub transports: Option<Vec<String>>,
    /// Override upstream proxy URL (socks5://, socks5h://, http://)
    #[arg(long)]
    pub proxy: Option<String>,
    /// Override transport options JSON
    #[arg(long)]
    pub options: Option<String>,

    #[command(flatten)]
    pub common: CommonOverrides,
}

#[derive(Debug, Clone, Parser, Default)]
pub struct ServerOverrides {
    /// Override bind list, name-host:port (repeatable or comma-separated)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub bind: Option<Vec<BindSpec>>,
    /// Override default upstream address, e.g. 127.0.0.1:9000
    #[arg(long)]
    pub upstream: Option<String>,
    /// Override transport state directory
    #[arg(long)]
    pub statedir: Option<PathBuf>,
    /// Override transport options (JSON or name:key=value;...)
    #[arg(long)]
    pub options: Option<String>,
    /// Override transport handshake timeout in seconds (0 = none)
    #[arg(long)]
    pub handshake_timeout_secs: Option<u64>,
    /// Override delay before a failed listener is rebound (milliseconds)
    #[arg(long)]
    pub rebind_delay_ms: Option<u64>,

    #[command(flatten)]
    pub common: CommonOverrides,
}

pub fn apply_client_overrides(config: &mut Config, overrides: &ClientOverrides) {
    let has_client = overrides.listen.is_some()
        || overrides.target.is_some()
        || overrides.transports.is_some()
        || overrides.proxy.is_some()
        || overrides.options.is_some();
    if has_client {
        let client = config.client.get_or_insert_with(ClientSettings::default);
        if let Some(v) = &overrides.listen {
            client.listen = v.clone();
        }
        if let Some(v) = &overrides.target {
            client.target = v.clone();
        }
        if let Some(v) = &overrides.transports {
            client.transports = v.clone();
        }
        if let Some(v) = &overrides.proxy {
            client.proxy = Some(v.clone());
        }
        if let Some(v) = &overrides.options {
            client.options = RawOptions::Text(v.clone());
        }
    }
    apply_common(config, &overrides.common);
}

pub fn apply_server_overrides(config: &mut Config, overrides: &ServerOverrides) {
    let has_server = overrides.bind.is_some()
        || overrides.upstream.is_some()
        || overrides.statedir.is_some()
        || overrides.options.is_some();
    if has_server {
        let server = config.server.get_or_insert_with(ServerSettings::default);
        if let Some(v) = &overrides.bind {
            server.bind = v.clone();
        }
        if let Some(v) = &overrides.upstream {
            server.upstream = Some(v.clone());
        }
        if let Some(v) = &overrides.statedir {
            server.statedir = v.clone();
        }
        if let Some(v) = &overrides.options {
            server.options = RawOptions::Text(v.clone());
        }
    }
    if let Some(v) = overrides.handshake_timeout_secs {
        config.timeouts.handshake_timeout_secs = v;
    }
    if let Some(v) = overrides.rebind_delay_ms {
        config.timeouts.rebind_delay_ms = v;
    }
    apply_common(config, &overrides.common);
}

fn apply_common(config: &mut Config, overrides: &CommonOverrides) {
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    if let Some(v) = &overrides.log_format {
        config.logging.format = Some(v.clone());
    }
    if let Some(v) = overrides.dial_timeout_secs {
        config.timeouts.dial_timeout_secs = v;
    }
    if let Some(v) = overrides.idle_timeout_secs {
        config.timeouts.idle_timeout_secs = v;
    }
    if let Some(v) = overrides.relay_buffer_size {
        config.timeouts.relay_buffer_size = v;
    }
}
