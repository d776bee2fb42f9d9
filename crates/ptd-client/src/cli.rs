//! CLI module for ptd-client.

use std::path::PathBuf;

use clap::Parser;
use ptd_config::{
    ClientOverrides, Config, ConfigError, apply_client_overrides, init_tracing, load_config,
    validate_client, validate_timeouts,
};
use ptd_core::signal::shutdown_signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// ptdispatch client CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ptd-client",
    version,
    about = "Forward local TCP connections through pluggable transports"
)]
pub struct ClientArgs {
    /// Config file path (toml/json/jsonc).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ClientOverrides,
}

/// Run the client with the given CLI arguments.
pub async fn run(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    apply_client_overrides(&mut config, &args.overrides);

    let client = config.client.as_ref().ok_or_else(|| {
        ConfigError::Validation("no [client] section; pass --config or --target".into())
    })?;
    validate_client(client)?;
    validate_timeouts(&config.timeouts)?;

    init_tracing(&config.logging);

    // Graceful shutdown
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
