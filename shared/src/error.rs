//! Error taxonomy shared by client and server
//!
//! Errors are split by how far they reach:
//! - [`ConnectError`]: establishing a listener or an outbound connection failed
//! - [`SessionError`]: an established session can no longer be used and gets closed
//! - [`ProtocolError`]: a single frame could not be understood and is dropped

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Failure to bind a listener or to reach a server.
///
/// The server treats this as fatal at startup. The client treats it as
/// retryable and schedules another attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("connecting to {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },
}

/// Failure on an established session. Always ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("send did not complete within {0:?}")]
    SendTimeout(Duration),
    #[error("frame exceeds {max} bytes without a delimiter")]
    FrameTooLong { max: usize },
    #[error("no data received for {idle:?}")]
    Stale { idle: Duration },
}

/// A frame that does not match any known message shape.
///
/// Never closes the session; the frame is logged and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unrecognized message: {0:?}")]
    Unrecognized(String),
    #[error("invalid position: {0:?}")]
    InvalidPosition(String),
}
