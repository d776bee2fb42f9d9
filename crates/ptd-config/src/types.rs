//! Configuration type definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ptd_core::io::RelayConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: Option<ClientSettings>,
    #[serde(default)]
    pub server: Option<ServerSettings>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Local address every transport listener binds, e.g. 127.0.0.1:1080.
    #[serde(default = "default_client_listen")]
    pub listen: String,
    /// Remote `host:port` each transport dials.
    #[serde(default)]
    pub target: String,
    /// Transport names; one listener is started per name.
    #[serde(default)]
    pub transports: Vec<String>,
    /// Upstream proxy URL (socks5://, socks5h:// or http://).
    #[serde(default)]
    pub proxy: Option<String>,
    /// Per-transport options, as a JSON string or an inline table.
    #[serde(default)]
    pub options: RawOptions,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            listen: default_client_listen(),
            target: String::new(),
            transports: Vec::new(),
            proxy: None,
            options: RawOptions::default(),
        }
    }
}

/// Server dispatcher settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listeners to start, each `name-host:port`.
    #[serde(default)]
    pub bind: Vec<BindSpec>,
    /// Upstream address used for every transport without its own entry.
    #[serde(default)]
    pub upstream: Option<String>,
    /// Per-transport upstream addresses.
    #[serde(default)]
    pub upstreams: BTreeMap<String, String>,
    /// Directory where transports keep persistent state. Empty means none.
    #[serde(default)]
    pub statedir: PathBuf,
    /// Per-transport options, as a string (JSON or `name:key=value;...`) or
    /// an inline table.
    #[serde(default)]
    pub options: RawOptions,
}

/// Options blob as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOptions {
    Text(String),
    Table(Map<String, Value>),
}

impl RawOptions {
    /// The textual blob handed to the options parsers.
    pub fn to_blob(&self) -> String {
        match self {
            RawOptions::Text(text) => text.clone(),
            RawOptions::Table(table) => Value::Object(table.clone()).to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawOptions::Text(text) => text.trim().is_empty(),
            RawOptions::Table(table) => table.is_empty(),
        }
    }
}

impl Default for RawOptions {
    fn default() -> Self {
        RawOptions::Text(String::new())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BindSpecError {
    #[error("bind spec `{0}` is not of the form name-host:port")]
    MissingSeparator(String),
    #[error("bind spec `{0}` has an empty transport name")]
    EmptyName(String),
    #[error("bind spec `{spec}` has an invalid address: {source}")]
    InvalidAddr {
        spec: String,
        #[source]
        source: AddrParseError,
    },
}

/// One server listener: a transport name and the address it binds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BindSpec {
    pub name: String,
    pub addr: SocketAddr,
}

impl BindSpec {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
        }
    }

    /// Parse a comma-separated list, as found in `TOR_PT_SERVER_BINDADDR`.
    pub fn parse_list(list: &str) -> Result<Vec<BindSpec>, BindSpecError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for BindSpec {
    type Err = BindSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, addr) = s
            .split_once('-')
            .ok_or_else(|| BindSpecError::MissingSeparator(s.to_string()))?;
        if name.is_empty() {
            return Err(BindSpecError::EmptyName(s.to_string()));
        }
        let addr = addr.parse().map_err(|source| BindSpecError::InvalidAddr {
            spec: s.to_string(),
            source,
        })?;
        Ok(BindSpec::new(name, addr))
    }
}

impl TryFrom<String> for BindSpec {
    type Error = BindSpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BindSpec> for String {
    fn from(spec: BindSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.addr)
    }
}

/// Timeouts, relay and socket tuning shared by both dispatchers.
///
/// A zero timeout disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_rebind_delay_ms")]
    pub rebind_delay_ms: u64,
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// TCP listener backlog.
    #[serde(default = "default_connection_backlog")]
    pub connection_backlog: u32,
    #[serde(default = "default_tcp_no_delay")]
    pub tcp_no_delay: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: default_dial_timeout_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            rebind_delay_ms: default_rebind_delay_ms(),
            relay_buffer_size: default_relay_buffer_size(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            connection_backlog: default_connection_backlog(),
            tcp_no_delay: default_tcp_no_delay(),
        }
    }
}

impl TimeoutConfig {
    pub fn dial_timeout(&self) -> Option<Duration> {
        secs_or_none(self.dial_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        secs_or_none(self.handshake_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        secs_or_none(self.idle_timeout_secs)
    }

    pub fn rebind_delay(&self) -> Duration {
        Duration::from_millis(self.rebind_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            buffer_size: self.relay_buffer_size,
            idle_timeout: self.idle_timeout(),
        }
    }
}

fn secs_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Log format: json, pretty, or compact. Default: pretty.
    pub format: Option<String>,
    /// Output target: stdout or stderr. Default: stderr.
    pub output: Option<String>,
    /// Per-module log level filters (e.g., {"ptd_transport": "debug", "rustls": "warn"}).
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_spec_parse() {
        let spec: BindSpec = "tls-127.0.0.1:443".parse().unwrap();
        assert_eq!(spec.name, "tls");
        assert_eq!(spec.addr, "127.0.0.1:443".parse::<SocketAddr>().unwrap());

        let spec: BindSpec = "ws-[::1]:8080".parse().unwrap();
        assert_eq!(spec.name, "ws");
        assert_eq!(spec.addr, "[::1]:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(spec.to_string(), "ws-[::1]:8080");
    }

    #[test]
    fn test_bind_spec_errors() {
        assert!(matches!(
            "127.0.0.1:443".parse::<BindSpec>(),
            Err(BindSpecError::MissingSeparator(_))
        ));
        assert!(matches!(
            "-127.0.0.1:443".parse::<BindSpec>(),
            Err(BindSpecError::EmptyName(_))
        ));
        assert!(matches!(
            "tls-localhost".parse::<BindSpec>(),
            Err(BindSpecError::InvalidAddr { .. })
        ));
    }

    #[test]
    fn test_bind_spec_list() {
        let specs = BindSpec::parse_list("tls-127.0.0.1:1, ws-127.0.0.1:2,").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name, "ws");
        assert!(BindSpec::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_raw_options_to_blob() {
        assert_eq!(RawOptions::Text("ws:path=/x".into()).to_blob(), "ws:path=/x");

        let mut table = Map::new();
        table.insert("ws".into(), serde_json::json!({"path": "/x"}));
        assert_eq!(RawOptions::Table(table).to_blob(), r#"{"ws":{"path":"/x"}}"#);
        assert!(RawOptions::default().is_empty());
    }

    #[test]
    fn test_timeouts_zero_disables() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.dial_timeout(), None);
        assert_eq!(timeouts.idle_timeout(), None);
        assert_eq!(timeouts.rebind_delay(), Duration::from_secs(1));

        let timeouts = TimeoutConfig {
            idle_timeout_secs: 90,
            ..TimeoutConfig::default()
        };
        let relay = timeouts.relay_config();
        assert_eq!(relay.idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(relay.buffer_size, ptd_core::DEFAULT_RELAY_BUFFER_SIZE);
    }
}
