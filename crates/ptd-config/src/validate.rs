//! Configuration validation logic.

use std::net::SocketAddr;

use ptd_core::defaults::SUPPORTED_PROXY_SCHEMES;
use url::Url;

use crate::loader::ConfigError;
use crate::options::{parse_options, parse_server_options};
use crate::{ClientSettings, Config, ServerSettings, TimeoutConfig};

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.client.is_none() && config.server.is_none() {
        return Err(ConfigError::Validation(
            "at least one of [client] or [server] must be configured".into(),
        ));
    }
    if let Some(client) = &config.client {
        validate_client(client)?;
    }
    if let Some(server) = &config.server {
        validate_server(server)?;
    }
    validate_timeouts(&config.timeouts)
}

pub fn validate_client(client: &ClientSettings) -> Result<(), ConfigError> {
    if client.listen.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::Validation(format!(
            "client.listen `{}` is not a socket address",
            client.listen
        )));
    }
    if !is_host_port(&client.target) {
        return Err(ConfigError::Validation(format!(
            "client.target `{}` must be host:port",
            client.target
        )));
    }
    if client.transports.is_empty() {
        return Err(ConfigError::Validation("client.transports is empty".into()));
    }
    if client.transports.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "client.transports contains an empty name".into(),
        ));
    }
    if let Some(proxy) = &client.proxy {
        validate_proxy_url(proxy)?;
    }
    parse_options(&client.options.to_blob())?;
    Ok(())
}

pub fn validate_server(server: &ServerSettings) -> Result<(), ConfigError> {
    if server.bind.is_empty() {
        return Err(ConfigError::Validation("server.bind is empty".into()));
    }
    if let Some(upstream) = &server.upstream
        && !is_host_port(upstream)
    {
        return Err(ConfigError::Validation(format!(
            "server.upstream `{upstream}` must be host:port"
        )));
    }
    for (name, upstream) in &server.upstreams {
        if !is_host_port(upstream) {
            return Err(ConfigError::Validation(format!(
                "server.upstreams.{name} `{upstream}` must be host:port"
            )));
        }
    }
    for spec in &server.bind {
        if server.upstream.is_none() && !server.upstreams.contains_key(&spec.name) {
            return Err(ConfigError::Validation(format!(
                "no upstream configured for transport `{}`",
                spec.name
            )));
        }
    }
    parse_server_options(&server.options.to_blob())?;
    Ok(())
}

pub fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<(), ConfigError> {
    if timeouts.relay_buffer_size == 0 {
        return Err(ConfigError::Validation(
            "timeouts.relay_buffer_size must be > 0".into(),
        ));
    }
    if timeouts.connection_backlog == 0 {
        return Err(ConfigError::Validation(
            "timeouts.connection_backlog must be > 0".into(),
        ));
    }
    Ok(())
}

fn validate_proxy_url(proxy: &str) -> Result<(), ConfigError> {
    let url = Url::parse(proxy)
        .map_err(|e| ConfigError::Validation(format!("client.proxy `{proxy}`: {e}")))?;
    if !SUPPORTED_PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::Validation(format!(
            "client.proxy scheme `{}` must be one of: {:?}",
            url.scheme(),
            SUPPORTED_PROXY_SCHEMES
        )));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::Validation(format!(
            "client.proxy `{proxy}` has no host"
        )));
    }
    Ok(())
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BindSpec, RawOptions};

    fn client() -> ClientSettings {
        ClientSettings {
            target: "example.com:443".into(),
            transports: vec!["plain".into()],
            ..ClientSettings::default()
        }
    }

    fn server() -> ServerSettings {
        ServerSettings {
            bind: vec!["tls-127.0.0.1:0".parse().unwrap()],
            upstream: Some("127.0.0.1:9000".into()),
            ..ServerSettings::default()
        }
    }

    #[test]
    fn test_valid_client_and_server() {
        let config = Config {
            client: Some(client()),
            server: Some(server()),
            ..Config::default()
        };
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(matches!(
            validate_config(&Config::default()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_client_target_and_transports() {
        let mut c = client();
        c.target = "example.com".into();
        assert!(validate_client(&c).is_err());

        let mut c = client();
        c.transports.clear();
        assert!(validate_client(&c).is_err());
    }

    #[test]
    fn test_client_proxy_schemes() {
        for ok in ["socks5://127.0.0.1:9050", "socks5h://u:p@proxy:1080", "http://proxy:3128"] {
            let mut c = client();
            c.proxy = Some(ok.into());
            validate_client(&c).unwrap();
        }
        let mut c = client();
        c.proxy = Some("ftp://proxy:21".into());
        assert!(validate_client(&c).is_err());
    }

    #[test]
    fn test_client_options_must_parse() {
        let mut c = client();
        c.options = RawOptions::Text("[]".into());
        assert!(matches!(validate_client(&c), Err(ConfigError::Options(_))));
    }

    #[test]
    fn test_server_route_coverage() {
        let mut s = server();
        s.upstream = None;
        assert!(validate_server(&s).is_err());

        s.upstreams.insert("tls".into(), "127.0.0.1:9001".into());
        validate_server(&s).unwrap();

        s.bind.push(BindSpec::new("ws", "127.0.0.1:0".parse().unwrap()));
        assert!(validate_server(&s).is_err());
    }

    #[test]
    fn test_server_options_must_parse() {
        let mut s = server();
        s.options = RawOptions::Text("ws:path".into());
        assert!(matches!(validate_server(&s), Err(ConfigError::Options(_))));
    }

    #[test]
    fn test_timeouts_buffer_size() {
        let timeouts = TimeoutConfig {
            relay_buffer_size: 0,
            ..TimeoutConfig::default()
        };
        assert!(validate_timeouts(&timeouts).is_err());
    }
}
