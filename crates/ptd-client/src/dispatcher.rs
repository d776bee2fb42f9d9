//! Local listeners and their accept loops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ptd_config::{ClientSettings, ConfigError, TimeoutConfig};
use ptd_core::io::ConnectionTracker;
use ptd_transport::listener::TcpTransportListener;
use ptd_transport::plain::PlainTransportAcceptor;
use ptd_transport::{AcceptError, Listener, SocketOptions, TransportRegistry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use url::Url;

use crate::error::ClientError;
use crate::handler::{ClientContext, handle_conn};

/// Everything needed to start the client side.
#[derive(Debug, Clone)]
pub struct ClientSetup {
    /// Address every transport listener binds to.
    pub local_addr: SocketAddr,
    /// Remote `host:port` each transport connects to.
    pub target: String,
    /// Optional upstream proxy (`socks5`, `socks5h` or `http`).
    pub proxy: Option<Url>,
    pub transports: Vec<String>,
    /// Raw JSON options blob, parsed per connection.
    pub options: String,
    pub timeouts: TimeoutConfig,
}

impl ClientSetup {
    pub fn from_config(
        client: &ClientSettings,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, ClientError> {
        let local_addr = client.listen.parse().map_err(|e| {
            ConfigError::Validation(format!("invalid listen address '{}': {e}", client.listen))
        })?;
        let proxy = client
            .proxy
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("invalid proxy URL: {e}")))?;

        Ok(Self {
            local_addr,
            target: client.target.clone(),
            proxy,
            transports: client.transports.clone(),
            options: client.options.to_blob(),
            timeouts: timeouts.clone(),
        })
    }

    fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            backlog: self.timeouts.connection_backlog,
            no_delay: self.timeouts.tcp_no_delay,
        }
    }
}

/// Why an accept loop stopped.
#[derive(Debug)]
pub enum AcceptLoopExit {
    /// The shutdown token was cancelled.
    Shutdown,
    /// The listener reported a non-recoverable error.
    Fatal(AcceptError),
}

/// Runs accept loops and hands connections to per-connection tasks.
#[derive(Debug, Clone)]
pub struct ClientDispatcher {
    ctx: Arc<ClientContext>,
    tracker: ConnectionTracker,
    shutdown: CancellationToken,
}

impl ClientDispatcher {
    pub fn new(
        setup: &ClientSetup,
        registry: Arc<TransportRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let ctx = ClientContext {
            target: setup.target.clone(),
            proxy: setup.proxy.clone(),
            options: setup.options.clone(),
            dial_timeout: setup.timeouts.dial_timeout(),
            relay: setup.timeouts.relay_config(),
            registry,
        };
        Self {
            ctx: Arc::new(ctx),
            tracker: ConnectionTracker::new(),
            shutdown,
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Spawn the accept loop for transport `name` over `listener`.
    pub fn serve(&self, name: &str, listener: Box<dyn Listener>) -> JoinHandle<AcceptLoopExit> {
        let name: Arc<str> = Arc::from(name);
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.accept_loop(name, listener).await })
    }

    async fn accept_loop(self, name: Arc<str>, mut listener: Box<dyn Listener>) -> AcceptLoopExit {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!(transport = %name, "accept loop stopped by shutdown");
                    return AcceptLoopExit::Shutdown;
                }

                result = listener.accept() => {
                    let incoming = match result {
                        Ok(incoming) => incoming,
                        Err(err) if err.is_fatal() => {
                            error!(transport = %name, error = %err, "accept failed, listener stopped");
                            return AcceptLoopExit::Fatal(err);
                        }
                        Err(err) => {
                            warn!(transport = %name, error = %err, "transient accept error");
                            continue;
                        }
                    };

                    let peer = incoming.peer();
                    debug!(transport = %name, peer = %peer, "new connection");
                    let guard = self.tracker.track();
                    let span = info_span!("conn", transport = %name, peer = %peer);
                    let ctx = self.ctx.clone();
                    let name = name.clone();
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

/// One bound client listener.
#[derive(Debug)]
pub struct ClientListener {
    name: String,
    local_addr: SocketAddr,
    handle: JoinHandle<AcceptLoopExit>,
}

impl ClientListener {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Listeners started by [`start_client_listeners`].
#[derive(Debug)]
pub struct ClientListeners {
    listeners: Vec<ClientListener>,
    dispatcher: ClientDispatcher,
}

impl ClientListeners {
    /// Number of listeners that were bound.
    pub fn launched(&self) -> usize {
        self.listeners.len()
    }

    pub fn listeners(&self) -> &[ClientListener] {
        &self.listeners
    }

    /// Bound address of the listener for transport `name`.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.local_addr)
    }

    pub fn active_connections(&self) -> usize {
        self.dispatcher.tracker.count()
    }

    /// Wait for every accept loop to stop, returning why each one did.
    pub async fn join(self) -> Vec<(String, AcceptLoopExit)> {
        let mut exits = Vec::with_capacity(self.listeners.len());
        for listener in self.listeners {
            match listener.handle.await {
                Ok(exit) => exits.push((listener.name, exit)),
                Err(e) => error!(transport = %listener.name, error = %e, "accept loop task failed"),
            }
        }
        exits
    }

    /// Stop accepting and wait up to `timeout` for open connections to close.
    ///
    /// Returns `true` if every connection closed in time.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.dispatcher.shutdown.cancel();
        let tracker = self.dispatcher.tracker.clone();
        self.join().await;

        let active = tracker.count();
        if active == 0 {
            return true;
        }
        info!("waiting for {} active connections to drain", active);
        if tracker.wait_for_zero(timeout).await {
            info!("all connections drained");
            true
        } else {
            warn!(
                "shutdown timeout, {} connections still active",
                tracker.count()
            );
            false
        }
    }
}

/// Bind one local listener per transport in `setup` and start serving.
///
/// A name whose listener cannot be bound is logged and skipped; the others
/// still start. Transport resolution happens per connection, so an unknown
/// name only fails the connections accepted on its listener.
pub fn start_client_listeners(
    setup: ClientSetup,
    registry: Arc<TransportRegistry>,
    shutdown: CancellationToken,
) -> ClientListeners {
    let socket = setup.socket_options();
    let dispatcher = ClientDispatcher::new(&setup, registry.clone(), shutdown.child_token());
    let mut listeners = Vec::with_capacity(setup.transports.len());

    for name in &setup.transports {
        if !registry.contains(name) {
            warn!(transport = %name, "transport is not registered, its connections will fail");
        }

        let bound = TcpTransportListener::bind(setup.local_addr, PlainTransportAcceptor, socket)
            .and_then(|listener| Ok((listener.local_addr()?, listener)));
        let (local_addr, listener) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                error!(transport = %name, addr = %setup.local_addr, error = %e, "failed to bind client listener");
                continue;
            }
        };

        info!(transport = %name, listen = %local_addr, target = %setup.target, "client listener started");
        let handle = dispatcher.serve(name, Box::new(listener));
        listeners.push(ClientListener {
            name: name.clone(),
            local_addr,
            handle,
        });
    }

    ClientListeners {
        listeners,
        dispatcher,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptd_config::RawOptions;

    #[test]
    fn test_setup_from_config() {
        let client = ClientSettings {
            listen: "127.0.0.1:0".into(),
            target: "203.0.113.7:443".into(),
            transports: vec!["tls".into()],
            proxy: Some("socks5h://127.0.0.1:9050".into()),
            options: RawOptions::Text(r#"{"tls": {"sni": "example.com"}}"#.into()),
        };
        let setup = ClientSetup::from_config(&client, &TimeoutConfig::default()).unwrap();
        assert_eq!(setup.local_addr.port(), 0);
        assert_eq!(setup.proxy.unwrap().scheme(), "socks5h");
        assert!(setup.options.contains("example.com"));
    }

    #[test]
    fn test_setup_rejects_bad_listen() {
        let client = ClientSettings {
            listen: "localhost".into(),
            ..Default::default()
        };
        assert!(matches!(
            ClientSetup::from_config(&client, &TimeoutConfig::default()),
            Err(ClientError::Config(_))
        ));
    }
}
