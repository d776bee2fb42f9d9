//! Accept error classification.
//!
//! A transient error affects only the connection being accepted (the peer
//! reset before we got to it, the process ran out of descriptors for a
//! moment); the listener stays usable. Anything else means the listener
//! itself is broken.

use std::io::{self, ErrorKind};

#[derive(Debug, thiserror::Error)]
#[error("accept failed: {source}")]
pub struct AcceptError {
    fatal: bool,
    #[source]
    source: io::Error,
}

impl AcceptError {
    pub fn transient(source: io::Error) -> Self {
        Self {
            fatal: false,
            source,
        }
    }

    pub fn fatal(source: io::Error) -> Self {
        Self {
            fatal: true,
            source,
        }
    }

    /// Classify an error returned by a socket accept.
    pub fn classify(source: io::Error) -> Self {
        if is_transient(&source) {
            Self::transient(source)
        } else {
            Self::fatal(source)
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn io_error(&self) -> &io::Error {
        &self.source
    }

    pub fn into_inner(self) -> io::Error {
        self.source
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) || is_resource_exhaustion(err)
}

#[cfg(unix)]
fn is_resource_exhaustion(err: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    #[cfg(target_os = "linux")]
    const ENOBUFS: i32 = 105;
    #[cfg(not(target_os = "linux"))]
    const ENOBUFS: i32 = 55;

    matches!(err.raw_os_error(), Some(ENFILE | EMFILE | ENOBUFS))
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_err: &io::Error) -> bool {
    false
}
