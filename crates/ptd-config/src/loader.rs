//! Configuration file loading and error types.

use std::{fs, path::Path};

use crate::Config;
use crate::options::OptionsError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("options: {0}")]
    Options(#[from] OptionsError),
    #[error("unsupported config format")]
    UnsupportedFormat,
    #[error("validation: {0}")]
    Validation(String),
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)?;
    match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
        "json" | "jsonc" => {
            let stripped = json_comments::StripComments::new(data.as_bytes());
            Ok(serde_json::from_reader(stripped)?)
        }
        "toml" => Ok(toml::from_str(&data)?),
        _ => Err(ConfigError::UnsupportedFormat),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::RawOptions;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            r#"
[client]
listen = "127.0.0.1:1081"
target = "203.0.113.7:443"
transports = ["tls", "ws"]
proxy = "socks5://127.0.0.1:9050"
options = '{"tls": {"sni": "example.com"}}'

[server]
bind = ["tls-0.0.0.0:443", "ws-0.0.0.0:8080"]
upstream = "127.0.0.1:9000"
statedir = "/var/lib/ptdispatch"
options = "ws:path=/tunnel"

[server.upstreams]
ws = "127.0.0.1:9001"

[timeouts]
dial_timeout_secs = 10
rebind_delay_ms = 250

[logging]
level = "debug"
format = "json"
"#,
        );

        let config = load_config(file.path()).unwrap();
        let client = config.client.unwrap();
        assert_eq!(client.listen, "127.0.0.1:1081");
        assert_eq!(client.transports, vec!["tls", "ws"]);
        assert_eq!(client.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));

        let server = config.server.unwrap();
        assert_eq!(server.bind.len(), 2);
        assert_eq!(server.bind[0].name, "tls");
        assert_eq!(server.upstreams.get("ws").map(String::as_str), Some("127.0.0.1:9001"));
        assert_eq!(server.options, RawOptions::Text("ws:path=/tunnel".into()));

        assert_eq!(config.timeouts.dial_timeout_secs, 10);
        assert_eq!(config.timeouts.rebind_delay_ms, 250);
        assert_eq!(config.timeouts.relay_buffer_size, 32768);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_toml_inline_options_table() {
        let file = write_config(
            ".toml",
            r#"
[client]
target = "example.com:443"
transports = ["ws"]

[client.options.ws]
path = "/t"
"#,
        );

        let config = load_config(file.path()).unwrap();
        let client = config.client.unwrap();
        assert_eq!(client.listen, "127.0.0.1:1080");
        let opts = crate::parse_options(&client.options.to_blob()).unwrap();
        assert_eq!(opts.args_for("ws").require_str("path").unwrap(), "/t");
    }

    #[test]
    fn test_load_jsonc_with_comments() {
        let file = write_config(
            ".jsonc",
            r#"{
  // client only
  "client": {
    "target": "example.com:443",
    "transports": ["plain"]
  }
}"#,
        );

        let config = load_config(file.path()).unwrap();
        assert!(config.server.is_none());
        assert_eq!(config.client.unwrap().transports, vec!["plain"]);
    }

    #[test]
    fn test_load_rejects_bad_bind_spec() {
        let file = write_config(".toml", "[server]\nbind = [\"no-separator-here\"]\n");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = write_config(".ini", "");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::UnsupportedFormat)
        ));
    }
}
