//! CLI module for ptd-server.
//!
//! Used both by the standalone `ptd-server` binary and the `server`
//! subcommand of the unified `ptdispatch` CLI.

use std::path::PathBuf;

use clap::Parser;
use ptd_config::{
    Config, ConfigError, ServerOverrides, apply_server_overrides, init_tracing, load_config,
    validate_server, validate_timeouts,
};
use ptd_core::signal::shutdown_signal;
use tracing::info;

use crate::CancellationToken;

/// ptdispatch server CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ptd-server",
    version,
    about = "Accept pluggable-transport connections and relay them upstream"
)]
pub struct ServerArgs {
    /// Config file path (toml/json/jsonc)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServerOverrides,
}

/// Run the server with the given arguments.
pub async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    apply_server_overrides(&mut config, &args.overrides);

    let server = config.server.as_ref().ok_or_else(|| {
        ConfigError::Validation("no [server] section; pass --config or --bind".into())
    })?;
    validate_server(server)?;
    validate_timeouts(&config.timeouts)?;

    init_tracing(&config.logging);

    // Set up graceful shutdown on SIGTERM/SIGINT
    let shutdown = CancellationToken::new();
    let shutdown_trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_trigger.cancel();
    });

    crate::run(config, shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_args() {
        let args = ServerArgs::parse_from([
            "ptd-server",
            "--bind",
            "tls-127.0.0.1:443,ws-127.0.0.1:8080",
            "--upstream",
            "127.0.0.1:9000",
            "--rebind-delay-ms",
            "250",
        ]);
        let bind = args.overrides.bind.unwrap();
        assert_eq!(bind.len(), 2);
        assert_eq!(bind[1].name, "ws");
        assert_eq!(args.overrides.rebind_delay_ms, Some(250));
    }

    #[tokio::test]
    async fn test_run_requires_server_section() {
        let args = ServerArgs::parse_from(["ptd-server"]);
        assert!(run(args).await.is_err());
    }
}
