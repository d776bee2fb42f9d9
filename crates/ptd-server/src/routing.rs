//! Upstream selection per transport.

use std::collections::BTreeMap;

use ptd_config::ServerSettings;

/// Maps a transport name to the upstream `host:port` its connections are
/// relayed to.
pub trait ServerRouting: Send + Sync + 'static {
    fn upstream_address_for(&self, transport: &str) -> Option<String>;
}

/// One upstream for every transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRouting(String);

impl StaticRouting {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
}

impl ServerRouting for StaticRouting {
    fn upstream_address_for(&self, _transport: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Per-transport upstreams with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    default: Option<String>,
    per_transport: BTreeMap<String, String>,
}

impl RoutingTable {
    pub fn new(default: Option<String>) -> Self {
        Self {
            default,
            per_transport: BTreeMap::new(),
        }
    }

    /// Route `transport` to `addr`, overriding the default.
    pub fn with_route(mut self, transport: impl Into<String>, addr: impl Into<String>) -> Self {
        self.per_transport.insert(transport.into(), addr.into());
        self
    }

    /// Build from the `upstream` and `upstreams` settings.
    pub fn from_settings(server: &ServerSettings) -> Self {
        Self {
            default: server.upstream.clone(),
            per_transport: server.upstreams.clone(),
        }
    }
}

impl ServerRouting for RoutingTable {
    fn upstream_address_for(&self, transport: &str) -> Option<String> {
        self.per_transport
            .get(transport)
            .or(self.default.as_ref())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_routing() {
        let routing = StaticRouting::new("127.0.0.1:9000");
        assert_eq!(
            routing.upstream_address_for("tls").as_deref(),
            Some("127.0.0.1:9000")
        );
        assert_eq!(
            routing.upstream_address_for("anything").as_deref(),
            Some("127.0.0.1:9000")
        );
    }

    #[test]
    fn test_routing_table_prefers_transport_route() {
        let routing =
            RoutingTable::new(Some("127.0.0.1:9000".into())).with_route("ws", "127.0.0.1:9001");
        assert_eq!(
            routing.upstream_address_for("ws").as_deref(),
            Some("127.0.0.1:9001")
        );
        assert_eq!(
            routing.upstream_address_for("tls").as_deref(),
            Some("127.0.0.1:9000")
        );
    }

    #[test]
    fn test_routing_table_without_default() {
        let routing = RoutingTable::default().with_route("ws", "127.0.0.1:9001");
        assert!(routing.upstream_address_for("tls").is_none());
    }

    #[test]
    fn test_from_settings() {
        let mut server = ServerSettings {
            upstream: Some("127.0.0.1:9000".into()),
            ..Default::default()
        };
        server
            .upstreams
            .insert("plain".into(), "127.0.0.1:9002".into());
        let routing = RoutingTable::from_settings(&server);
        assert_eq!(
            routing.upstream_address_for("plain").as_deref(),
            Some("127.0.0.1:9002")
        );
        assert_eq!(
            routing.upstream_address_for("ws").as_deref(),
            Some("127.0.0.1:9000")
        );
    }
}
