//! Bidirectional relay between two established connections.
//!
//! Each direction is copied by its own task. Both tasks report into a
//! two-slot channel, so neither completion waits on the other being
//! consumed, and both are joined before [`relay`] returns: no copy task
//! outlives the call.
//!
//! The outcome is the first error observed in either direction. End of
//! stream is not an error; a direction that reaches it half-closes its
//! destination and the opposite direction keeps draining. Once one
//! direction fails the other is cancelled, since its peer is usually gone
//! and any later error would only be an artifact of the first.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::defaults::DEFAULT_RELAY_BUFFER_SIZE;

/// Relay tuning.
///
/// `idle_timeout: None` keeps a relay alive for as long as both peers do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Size of the read buffer used by each direction.
    pub buffer_size: usize,
    /// Close the relay once neither direction has moved data for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_RELAY_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Identifies one of the two connections handed to [`relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("a"),
            Side::B => f.write_str("b"),
        }
    }
}

/// Terminal relay failure.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("copy loop has a nil connection ({0})")]
    MissingConnection(Side),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("relay idle for {0:?}")]
    IdleTimeout(Duration),
}

/// Bytes moved by a relay that closed cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// The terminal result of a relay.
pub type RelayOutcome = Result<RelayStats, RelayError>;

#[derive(Debug, Clone, Copy)]
enum Direction {
    AToB,
    BToA,
}

impl RelayStats {
    fn record(&mut self, direction: Direction, bytes: u64) {
        match direction {
            Direction::AToB => self.a_to_b = bytes,
            Direction::BToA => self.b_to_a = bytes,
        }
    }
}

/// Last time either direction moved data, as millis since relay start.
struct Activity {
    start: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.start + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}

type Report = (Direction, io::Result<u64>);

/// Relay bytes between `a` and `b` until both directions have terminated.
///
/// Passing `None` for either side fails immediately with
/// [`RelayError::MissingConnection`] and starts no copy.
pub async fn relay<A, B>(a: Option<A>, b: Option<B>, config: &RelayConfig) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let a = a.ok_or(RelayError::MissingConnection(Side::A))?;
    let b = b.ok_or(RelayError::MissingConnection(Side::B))?;

    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let cancel = CancellationToken::new();
    let activity = Arc::new(Activity::new());
    let (tx, mut rx) = mpsc::channel::<Report>(2);

    let forward = tokio::spawn(run_direction(
        Direction::AToB,
        a_read,
        b_write,
        config.buffer_size,
        cancel.clone(),
        activity.clone(),
        tx.clone(),
    ));
    let backward = tokio::spawn(run_direction(
        Direction::BToA,
        b_read,
        a_write,
        config.buffer_size,
        cancel.clone(),
        activity.clone(),
        tx,
    ));

    let mut stats = RelayStats::default();
    let mut first_error: Option<RelayError> = None;
    let mut watchdog = config.idle_timeout;

    loop {
        let report = match watchdog {
            Some(limit) => {
                let deadline = activity.last() + limit;
                tokio::select! {
                    report = rx.recv() => report,
                    _ = tokio::time::sleep_until(deadline) => {
                        if activity.last() + limit <= Instant::now() {
                            debug!(idle = ?limit, "relay idle, cancelling both directions");
                            if first_error.is_none() {
                                first_error = Some(RelayError::IdleTimeout(limit));
                            }
                            cancel.cancel();
                            watchdog = None;
                        }
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        // `None` once both directions have dropped their sender.
        let Some((direction, result)) = report else {
            break;
        };
        match result {
            Ok(bytes) => stats.record(direction, bytes),
            Err(e) => {
                trace!(?direction, error = %e, "relay direction failed");
                if first_error.is_none() {
                    first_error = Some(RelayError::Io(e));
                }
            }
        }
    }

    for handle in [forward, backward] {
        if let Err(e) = handle.await
            && first_error.is_none()
        {
            first_error = Some(RelayError::Io(io::Error::other(e)));
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

async fn run_direction<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    cancel: CancellationToken,
    activity: Arc<Activity>,
    report: mpsc::Sender<Report>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        result = copy_until_eof(&mut reader, &mut writer, buffer_size, &activity, &mut copied) => result,
    };

    if result.is_err() {
        cancel.cancel();
    }
    // Capacity 2 with one message per direction: never waits.
    let _ = report.send((direction, result.map(|()| copied))).await;
}

/// Copy `reader` into `writer` until end of stream, then half-close `writer`.
async fn copy_until_eof<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    activity: &Activity,
    copied: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
        activity.touch();
    }

    let _ = writer.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};

    #[tokio::test]
    async fn test_relay_missing_connection() {
        let (_peer, b) = duplex(64);
        let err = relay::<DuplexStream, _>(None, Some(b), &RelayConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingConnection(Side::A)));

        let (a, _peer) = duplex(64);
        let err = relay::<_, DuplexStream>(Some(a), None, &RelayConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingConnection(Side::B)));
    }

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (app, a) = duplex(1024);
        let (b, remote) = duplex(1024);

        let handle =
            tokio::spawn(async move { relay(Some(a), Some(b), &RelayConfig::default()).await });

        let (mut app_r, mut app_w) = tokio::io::split(app);
        let (mut remote_r, mut remote_w) = tokio::io::split(remote);

        app_w.write_all(b"ping").await.unwrap();
        remote_w.write_all(b"pong").await.unwrap();

        let mut buf = [0u8; 4];
        remote_r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        app_r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        // Half-close from the application side propagates as EOF.
        app_w.shutdown().await.unwrap();
        let mut rest = Vec::new();
        remote_r.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        remote_w.shutdown().await.unwrap();
        app_r.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(
            stats,
            RelayStats {
                a_to_b: 4,
                b_to_a: 4
            }
        );
    }

    #[tokio::test]
    async fn test_relay_preserves_order() {
        let (app, a) = duplex(64);
        let (b, remote) = duplex(64);
        let config = RelayConfig {
            buffer_size: 100,
            idle_timeout: None,
        };

        let handle = tokio::spawn(async move { relay(Some(a), Some(b), &config).await });

        let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let (mut app_r, mut app_w) = tokio::io::split(app);
        let writer = tokio::spawn(async move {
            app_w.write_all(&payload).await.unwrap();
            app_w.shutdown().await.unwrap();
        });

        let (mut remote_r, mut remote_w) = tokio::io::split(remote);
        let mut received = Vec::new();
        remote_r.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);
        writer.await.unwrap();

        remote_w.shutdown().await.unwrap();
        let mut rest = Vec::new();
        app_r.read_to_end(&mut rest).await.unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.a_to_b, expected.len() as u64);
        assert_eq!(stats.b_to_a, 0);
    }

    #[tokio::test]
    async fn test_relay_clean_close_when_one_end_closes() {
        let (app, a) = duplex(1024);
        let (b, mut remote) = duplex(1024);

        let handle =
            tokio::spawn(async move { relay(Some(a), Some(b), &RelayConfig::default()).await });

        drop(app);

        // The remote observes EOF and closes in turn.
        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        drop(remote);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn test_relay_reports_first_error() {
        let (app, a) = duplex(1024);
        let (b, mut remote) = duplex(1024);

        let handle =
            tokio::spawn(async move { relay(Some(a), Some(b), &RelayConfig::default()).await });

        drop(app);
        remote.write_all(b"late data").await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        match err {
            RelayError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_idle_timeout() {
        let (_app, a) = duplex(1024);
        let (b, _remote) = duplex(1024);
        let config = RelayConfig {
            buffer_size: 1024,
            idle_timeout: Some(Duration::from_millis(50)),
        };

        let start = Instant::now();
        let err = relay(Some(a), Some(b), &config).await.unwrap_err();

        assert!(matches!(err, RelayError::IdleTimeout(_)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
