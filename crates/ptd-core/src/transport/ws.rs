//! WebSocket stream adapter.
//!
//! `WsIo` wraps a `WebSocketStream` and exposes it as `AsyncRead +
//! AsyncWrite`: every write becomes one binary frame, and incoming binary or
//! text frames are concatenated into a byte stream. Close frames read as EOF.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Error as WsError, Message},
};

/// Byte-stream view of a WebSocket connection.
pub struct WsIo<S> {
    ws: WebSocketStream<S>,
    pending: Bytes,
}

impl<S> WsIo<S> {
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            pending: Bytes::new(),
        }
    }

    /// Consumes the adapter and returns the underlying WebSocket stream.
    pub fn into_inner(self) -> WebSocketStream<S> {
        self.ws
    }

    fn drain_pending(&mut self, buf: &mut ReadBuf<'_>) {
        let n = self.pending.len().min(buf.remaining());
        buf.put_slice(&self.pending[..n]);
        self.pending = self.pending.slice(n..);
    }
}

impl<S> AsyncRead for WsIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.pending.is_empty() {
            self.drain_pending(buf);
            return Poll::Ready(Ok(()));
        }

        loop {
            match Pin::new(&mut self.ws).poll_next(cx) {
                Poll::Ready(Some(Ok(msg))) => match msg {
                    Message::Binary(data) => {
                        if data.is_empty() {
                            continue;
                        }
                        self.pending = Bytes::from(data);
                        self.drain_pending(buf);
                        return Poll::Ready(Ok(()));
                    }
                    Message::Text(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        self.pending = Bytes::from(text.into_bytes());
                        self.drain_pending(buf);
                        return Poll::Ready(Ok(()));
                    }
                    // tungstenite queues the pong itself; it goes out on the next flush.
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                    Message::Close(_) => return Poll::Ready(Ok(())),
                },
                Poll::Ready(Some(Err(WsError::ConnectionClosed))) | Poll::Ready(None) => {
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Err(ws_err(err))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for WsIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut ws = Pin::new(&mut self.ws);
        match ws.as_mut().poll_ready(cx) {
            Poll::Ready(Ok(())) => {
                if let Err(err) = ws.start_send(Message::Binary(data.to_vec())) {
                    return Poll::Ready(Err(ws_err(err)));
                }
                Poll::Ready(Ok(data.len()))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(ws_err(err))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.ws).poll_flush(cx).map_err(ws_err)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match Pin::new(&mut self.ws).poll_close(cx) {
            Poll::Ready(Err(WsError::ConnectionClosed)) => Poll::Ready(Ok(())),
            other => other.map_err(ws_err),
        }
    }
}

fn ws_err(err: WsError) -> std::io::Error {
    std::io::Error::other(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_tungstenite::{accept_async, client_async};

    #[tokio::test]
    async fn test_ws_io_round_trip() {
        let (client_io, server_io) = duplex(4096);

        let server = tokio::spawn(async move {
            let ws = accept_async(server_io).await.unwrap();
            let mut io = WsIo::new(ws);
            let mut buf = [0u8; 5];
            io.read_exact(&mut buf).await.unwrap();
            io.write_all(&buf).await.unwrap();
            io.flush().await.unwrap();
            buf
        });

        let (ws, _response) = client_async("ws://localhost/", client_io).await.unwrap();
        let mut io = WsIo::new(ws);
        io.write_all(b"hello").await.unwrap();
        io.flush().await.unwrap();

        let mut echoed = [0u8; 5];
        io.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");
        assert_eq!(&server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_ws_io_close_reads_as_eof() {
        let (client_io, server_io) = duplex(4096);

        let server = tokio::spawn(async move {
            let ws = accept_async(server_io).await.unwrap();
            let mut io = WsIo::new(ws);
            let mut rest = Vec::new();
            io.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let (ws, _response) = client_async("ws://localhost/", client_io).await.unwrap();
        let mut io = WsIo::new(ws);
        io.write_all(b"bye").await.unwrap();
        io.shutdown().await.unwrap();

        assert_eq!(server.await.unwrap(), b"bye");
    }
}
