//! Per-connection handling: build the outbound transport, dial, relay.

use std::sync::Arc;
use std::time::Duration;

use ptd_config::parse_options;
use ptd_core::io::{RelayConfig, RelayStats, relay};
use ptd_transport::{Incoming, TransportRegistry, dialer_from_url, with_timeout};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

/// Settings shared by every connection of a client dispatcher.
#[derive(Debug)]
pub(crate) struct ClientContext {
    pub target: String,
    pub proxy: Option<Url>,
    pub options: String,
    pub dial_timeout: Option<Duration>,
    pub relay: RelayConfig,
    pub registry: Arc<TransportRegistry>,
}

/// Handle one accepted local connection for transport `name`.
pub(crate) async fn handle_conn(incoming: Incoming, name: Arc<str>, ctx: Arc<ClientContext>) {
    let start = Instant::now();
    match handle_conn_inner(incoming, &name, &ctx).await {
        Ok(stats) => {
            info!(
                bytes_up = stats.a_to_b,
                bytes_down = stats.b_to_a,
                duration_ms = start.elapsed().as_millis() as u64,
                "closed connection"
            );
        }
        Err(err @ ClientError::Relay(_)) => {
            warn!(kind = err.error_type(), error = %err, "closed connection with error");
        }
        Err(err) => {
            warn!(kind = err.error_type(), error = %err, "failed to open transport connection");
        }
    }
}

async fn handle_conn_inner(
    incoming: Incoming,
    name: &str,
    ctx: &ClientContext,
) -> Result<RelayStats, ClientError> {
    let local = incoming.establish().await.map_err(ClientError::Resolve)?;

    // Dialer, options and transport are built per connection.
    let dialer = dialer_from_url(ctx.proxy.as_ref()).map_err(ClientError::Proxy)?;
    let options = parse_options(&ctx.options)?;
    let transport = ctx
        .registry
        .resolve_client(name, &ctx.target, &options, dialer)
        .map_err(ClientError::Resolve)?;

    let remote = with_timeout("dial", ctx.dial_timeout, transport.dial())
        .await
        .map_err(ClientError::Dial)?;
    debug!(target_addr = %ctx.target, "transport connection established");

    Ok(relay(Some(local), Some(remote), &ctx.relay).await?)
}
