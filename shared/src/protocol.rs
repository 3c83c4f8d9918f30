//! Text messages exchanged between client and server
//!
//! Four payload shapes exist on the wire:
//! - `"<x>,<y>"` position update pushed by the server
//! - `"HEARTBEAT"` liveness ping sent by the client
//! - `"CLIENT_CONNECTED"` / `"CLIENT_DISCONNECTING"` lifecycle hints
//!
//! Payloads never contain a newline; [`crate::framing`] uses `\n` as the
//! frame delimiter.

use crate::error::ProtocolError;
use crate::Position;
use std::fmt;

pub const HEARTBEAT: &str = "HEARTBEAT";
pub const CLIENT_CONNECTED: &str = "CLIENT_CONNECTED";
pub const CLIENT_DISCONNECTING: &str = "CLIENT_DISCONNECTING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Position(Position),
    Heartbeat,
    ClientConnected,
    ClientDisconnecting,
}

impl Message {
    /// Parses one frame payload.
    ///
    /// Surrounding whitespace is ignored. A position must be exactly two
    /// comma-separated decimal integers; anything else is rejected so the
    /// caller can log and drop it.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        match text {
            "" => Err(ProtocolError::Empty),
            HEARTBEAT => Ok(Message::Heartbeat),
            CLIENT_CONNECTED => Ok(Message::ClientConnected),
            CLIENT_DISCONNECTING => Ok(Message::ClientDisconnecting),
            _ if text.contains(',') => parse_position(text).map(Message::Position),
            _ => Err(ProtocolError::Unrecognized(text.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Position(pos) => write!(f, "{},{}", pos.x, pos.y),
            Message::Heartbeat => f.write_str(HEARTBEAT),
            Message::ClientConnected => f.write_str(CLIENT_CONNECTED),
            Message::ClientDisconnecting => f.write_str(CLIENT_DISCONNECTING),
        }
    }
}

fn parse_position(text: &str) -> Result<Position, ProtocolError> {
    let invalid = || ProtocolError::InvalidPosition(text.to_string());

    let mut fields = text.split(',');
    let (Some(x), Some(y), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(invalid());
    };

    let x = x.trim().parse::<i32>().map_err(|_| invalid())?;
    let y = y.trim().parse::<i32>().map_err(|_| invalid())?;
    Ok(Position::new(x, y))
}
