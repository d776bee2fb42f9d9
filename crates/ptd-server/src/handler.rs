//! Per-connection handling: finish the handshake, connect upstream, relay.

use std::sync::Arc;
use std::time::Duration;

use ptd_core::io::{RelayConfig, RelayStats, relay};
use ptd_transport::{Incoming, TransportError, with_timeout};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::routing::ServerRouting;

pub(crate) struct ServerContext {
    pub routing: Arc<dyn ServerRouting>,
    pub handshake_timeout: Option<Duration>,
    pub dial_timeout: Option<Duration>,
    pub relay: RelayConfig,
    pub no_delay: bool,
}

pub(crate) async fn handle_conn(incoming: Incoming, name: Arc<str>, ctx: Arc<ServerContext>) {
    let start = Instant::now();
    match handle_conn_inner(incoming, &name, &ctx).await {
        Ok(stats) => {
            info!(
                bytes_up = stats.b_to_a,
                bytes_down = stats.a_to_b,
                duration_ms = start.elapsed().as_millis() as u64,
                "closed connection"
            );
        }
        Err(err @ ServerError::Relay(_)) => {
            warn!(kind = err.error_type(), error = %err, "closed connection with error");
        }
        Err(err) => {
            warn!(kind = err.error_type(), error = %err, "failed to forward connection");
        }
    }
}

async fn handle_conn_inner(
    incoming: Incoming,
    name: &str,
    ctx: &ServerContext,
) -> Result<RelayStats, ServerError> {
    let inbound = with_timeout("handshake", ctx.handshake_timeout, incoming.establish())
        .await
        .map_err(ServerError::Handshake)?;

    let addr = ctx
        .routing
        .upstream_address_for(name)
        .ok_or_else(|| ServerError::NoRoute(name.to_string()))?;
    let connect = async { TcpStream::connect(addr.as_str()).await.map_err(TransportError::Io) };
    let upstream = with_timeout("upstream connect", ctx.dial_timeout, connect)
        .await
        .map_err(|source| ServerError::Upstream {
            addr: addr.clone(),
            source,
        })?;
    if ctx.no_delay
        && let Err(e) = upstream.set_nodelay(true)
    {
        debug!(upstream = %addr, error = %e, "failed to set TCP_NODELAY");
    }
    debug!(upstream = %addr, "upstream connected");

    Ok(relay(Some(upstream), Some(inbound), &ctx.relay).await?)
}
