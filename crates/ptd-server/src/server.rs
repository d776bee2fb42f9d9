//! Transport listeners, their supervisors and accept loops.
//!
//! Each bind spec gets a supervisor task that owns the listener. A fatal
//! accept error or a failed bind drops the listener and, after the rebind
//! delay, binds it again; only shutdown ends a supervisor.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ptd_config::{BindSpec, ServerSettings, TimeoutConfig, parse_server_options};
use ptd_core::io::ConnectionTracker;
use ptd_transport::{Listener, ServerTransport, TransportRegistry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::handler::{ServerContext, handle_conn};
use crate::routing::ServerRouting;

/// Everything needed to start the server side.
#[derive(Debug, Clone)]
pub struct ServerSetup {
    pub bind_specs: Vec<BindSpec>,
    /// Directory for persistent transport state; empty means none.
    pub statedir: PathBuf,
    /// Raw options blob, JSON or `name:key=value;...`.
    pub options: String,
    pub timeouts: TimeoutConfig,
}

impl ServerSetup {
    pub fn from_config(server: &ServerSettings, timeouts: &TimeoutConfig) -> Self {
        Self {
            bind_specs: server.bind.clone(),
            statedir: server.statedir.clone(),
            options: server.options.to_blob(),
            timeouts: timeouts.clone(),
        }
    }
}

enum LoopExit {
    Shutdown,
    Fatal,
}

struct Supervisor {
    name: Arc<str>,
    bind: SocketAddr,
    transport: Arc<dyn ServerTransport>,
    ctx: Arc<ServerContext>,
    tracker: ConnectionTracker,
    shutdown: CancellationToken,
    rebind_delay: Duration,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl Supervisor {
    async fn run(self) {
        loop {
            let listened = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.transport.listen(self.bind) => result,
            };

            match listened {
                Ok(listener) => {
                    let local = listener.local_addr().unwrap_or(self.bind);
                    self.bound.send_replace(Some(local));
                    info!(transport = %self.name, listen = %local, "server listener started");

                    let exit = self.accept_loop(listener).await;
                    self.bound.send_replace(None);
                    if let LoopExit::Shutdown = exit {
                        break;
                    }
                }
                Err(e) => {
                    error!(
                        transport = %self.name,
                        addr = %self.bind,
                        kind = e.error_type(),
                        error = %e,
                        "failed to bind server listener"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.rebind_delay) => {}
            }
            info!(transport = %self.name, addr = %self.bind, "rebinding server listener");
        }

        self.bound.send_replace(None);
        debug!(transport = %self.name, "server listener stopped");
    }

    async fn accept_loop(&self, mut listener: Box<dyn Listener>) -> LoopExit {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return LoopExit::Shutdown,

                result = listener.accept() => {
                    let incoming = match result {
                        Ok(incoming) => incoming,
                        Err(err) if err.is_fatal() => {
                            error!(transport = %self.name, error = %err, "accept failed, dropping listener");
                            return LoopExit::Fatal;
                        }
                        Err(err) => {
                            warn!(transport = %self.name, error = %err, "transient accept error");
                            continue;
                        }
                    };

                    let peer = incoming.peer();
                    debug!(transport = %self.name, peer = %peer, "new connection");
                    let guard = self.tracker.track();
                    let span = info_span!("conn", transport = %self.name, peer = %peer);
                    let ctx = self.ctx.clone();
                    let name = self.name.clone();
                    tokio::spawn(
                        async move {
                            let _guard = guard;
                            handle_conn(incoming, name, ctx).await;
                        }
                        .instrument(span),
                    );
                }
            }
        }
    }
}

/// One supervised server listener.
#[derive(Debug)]
pub struct ServerListener {
    spec: BindSpec,
    bound: watch::Receiver<Option<SocketAddr>>,
    handle: JoinHandle<()>,
}

impl ServerListener {
    pub fn spec(&self) -> &BindSpec {
        &self.spec
    }

    /// Address the listener is bound to right now, if any.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound.borrow()
    }

    /// Wait until the listener is bound.
    ///
    /// Returns `None` once the supervisor has stopped.
    pub async fn wait_bound(&self) -> Option<SocketAddr> {
        let mut bound = self.bound.clone();
        bound
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|addr| *addr)
    }
}

/// Listeners started by [`start_server_listeners`].
#[derive(Debug)]
pub struct ServerListeners {
    listeners: Vec<ServerListener>,
    tracker: ConnectionTracker,
    shutdown: CancellationToken,
}

impl ServerListeners {
    /// Number of bind specs that got a supervisor.
    pub fn launched(&self) -> usize {
        self.listeners.len()
    }

    pub fn listeners(&self) -> &[ServerListener] {
        &self.listeners
    }

    /// First listener serving transport `name`.
    pub fn listener(&self, name: &str) -> Option<&ServerListener> {
        self.listeners.iter().find(|l| l.spec.name == name)
    }

    pub fn active_connections(&self) -> usize {
        self.tracker.count()
    }

    /// Stop every supervisor and wait up to `timeout` for open connections
    /// to close.
    ///
    /// Returns `true` if every connection closed in time.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.shutdown.cancel();
        for listener in self.listeners {
            if let Err(e) = listener.handle.await {
                error!(transport = %listener.spec.name, error = %e, "server listener task failed");
            }
        }

        let active = self.tracker.count();
        if active == 0 {
            return true;
        }
        info!("waiting for {} active connections to drain", active);
        if self.tracker.wait_for_zero(timeout).await {
            info!("all connections drained");
            true
        } else {
            warn!(
                "shutdown timeout, {} connections still active",
                self.tracker.count()
            );
            false
        }
    }
}

/// Start one supervised listener per bind spec.
///
/// The options blob is parsed once for all specs; if it is malformed no
/// listener starts. A spec whose transport cannot be resolved is logged and
/// skipped.
pub fn start_server_listeners(
    setup: ServerSetup,
    routing: Arc<dyn ServerRouting>,
    registry: Arc<TransportRegistry>,
    shutdown: CancellationToken,
) -> ServerListeners {
    let shutdown = shutdown.child_token();
    let tracker = ConnectionTracker::new();
    let mut listeners = Vec::with_capacity(setup.bind_specs.len());

    let options = match parse_server_options(&setup.options) {
        Ok(options) => options,
        Err(e) => {
            error!(error = %e, "failed to parse server transport options, no listener started");
            return ServerListeners {
                listeners,
                tracker,
                shutdown,
            };
        }
    };

    let ctx = Arc::new(ServerContext {
        routing,
        handshake_timeout: setup.timeouts.handshake_timeout(),
        dial_timeout: setup.timeouts.dial_timeout(),
        relay: setup.timeouts.relay_config(),
        no_delay: setup.timeouts.tcp_no_delay,
    });

    for spec in &setup.bind_specs {
        let transport = match registry.resolve_server(&spec.name, &setup.statedir, &options) {
            Ok(transport) => transport,
            Err(e) => {
                error!(
                    transport = %spec.name,
                    addr = %spec.addr,
                    kind = e.error_type(),
                    error = %e,
                    "failed to set up server transport"
                );
                continue;
            }
        };

        let (bound_tx, bound_rx) = watch::channel(None);
        let supervisor = Supervisor {
            name: Arc::from(spec.name.as_str()),
            bind: spec.addr,
            transport,
            ctx: ctx.clone(),
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
            rebind_delay: setup.timeouts.rebind_delay(),
            bound: bound_tx,
        };
        listeners.push(ServerListener {
            spec: spec.clone(),
            bound: bound_rx,
            handle: tokio::spawn(supervisor.run()),
        });
    }

    ServerListeners {
        listeners,
        tracker,
        shutdown,
    }
}
