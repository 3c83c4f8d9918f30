//! Protocol and connection primitives shared by the broadcast server and client
//!
//! - [`protocol`]: the four text messages and their parsing rules
//! - [`framing`]: newline delimited frames on top of the TCP byte stream
//! - [`session`]: one connection with its liveness bookkeeping
//! - [`liveness`]: heartbeat pacing and staleness detection
//! - [`error`]: error types for connect, session and protocol failures

pub mod error;
pub mod framing;
pub mod liveness;
pub mod protocol;
pub mod session;

pub use error::{ConnectError, ProtocolError, SessionError};
pub use liveness::{Liveness, LivenessMonitor};
pub use protocol::Message;
pub use session::{Session, SessionReader, Transport};

use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1111;

pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const STALE_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub const OBJECT_START_X: i32 = 20;
pub const OBJECT_START_Y: i32 = 20;
pub const OBJECT_SIZE: i32 = 30;
pub const OBJECT_STEP: i32 = 10;
pub const AREA_WIDTH: i32 = 800;

/// Top-left corner of the moving rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}
