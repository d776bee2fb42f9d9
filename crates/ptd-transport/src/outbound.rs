//! Client transports that run a handshake over a dialed connection.

use std::sync::Arc;

use crate::error::TransportError;
use crate::{BoxFuture, BoxedConnection, ClientTransport, Dialer};

/// Runs a transport's client handshake over an already dialed stream.
pub trait TransportConnector: Send + Sync + 'static {
    fn connect(&self, stream: BoxedConnection) -> BoxFuture<'_, Result<BoxedConnection, TransportError>>;
}

/// Dials the target through a [`Dialer`], then wraps the stream with a
/// [`TransportConnector`].
pub struct DialingTransport<C> {
    name: String,
    target: String,
    dialer: Arc<dyn Dialer>,
    connector: C,
}

impl<C: TransportConnector> DialingTransport<C> {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        dialer: Arc<dyn Dialer>,
        connector: C,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            dialer,
            connector,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl<C: TransportConnector> ClientTransport for DialingTransport<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dial(&self) -> BoxFuture<'_, Result<BoxedConnection, TransportError>> {
        Box::pin(async move {
            let stream = self.dialer.dial(&self.target).await?;
            self.connector.connect(stream).await
        })
    }
}
