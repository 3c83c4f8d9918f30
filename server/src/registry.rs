//! Server-side set of live sessions
//!
//! The registry is touched from three directions at once:
//! - the accept path adds new sessions
//! - each session's receive task removes its own session when the peer leaves
//! - the tick path broadcasts to everyone and drops sessions whose send failed
//!
//! All of them go through one mutex around the map. The lock is held only to
//! insert, remove or clone a snapshot; no I/O ever happens under it, so a slow
//! peer cannot stall registration or removal of others.

use log::{debug, info, warn};
use shared::framing::encode_frame;
use shared::{Message, Position, Session, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Result of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Sessions the frame was written to
    pub delivered: usize,
    /// Sessions found closed or failing, removed after the pass
    pub dropped: usize,
}

pub struct SessionRegistry<S = TcpStream> {
    sessions: Mutex<HashMap<String, Arc<Session<S>>>>,
}

impl<S: Transport> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a session under its identity.
    ///
    /// A session already registered under the same identity is replaced and
    /// returned so the caller can close it.
    pub async fn add(&self, session: Arc<Session<S>>) -> Option<Arc<Session<S>>> {
        let identity = session.identity().to_string();
        let (previous, total) = {
            let mut sessions = self.sessions.lock().await;
            let previous = sessions.insert(identity.clone(), session);
            (previous, sessions.len())
        };

        info!("Client {} connected, total clients: {}", identity, total);
        previous
    }

    /// Removes a session. Removing an absent identity is a no-op.
    pub async fn remove(&self, identity: &str) -> Option<Arc<Session<S>>> {
        let (removed, remaining) = {
            let mut sessions = self.sessions.lock().await;
            let removed = sessions.remove(identity);
            (removed, sessions.len())
        };

        if removed.is_some() {
            info!(
                "Client {} removed, remaining clients: {}",
                identity, remaining
            );
        }
        removed
    }

    pub async fn get(&self, identity: &str) -> Option<Arc<Session<S>>> {
        self.sessions.lock().await.get(identity).cloned()
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.sessions.lock().await.contains_key(identity)
    }

    /// Clones the current set of sessions for iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<Arc<Session<S>>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Number of registered sessions.
    ///
    /// Only a momentary value: accepts and disconnects on other tasks may
    /// change it right after the lock is released.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Sends `pos` to every registered session.
    ///
    /// The frame is encoded once and all sends of a pass run concurrently, so
    /// a pass takes at most one send timeout no matter how many peers stopped
    /// reading. Sessions that are already closed or whose send fails are
    /// collected during the pass and removed only after it has finished.
    pub async fn broadcast_position(&self, pos: Position) -> BroadcastOutcome {
        let frame: Arc<[u8]> = encode_frame(&Message::Position(pos)).into();
        let snapshot = self.snapshot().await;

        let mut outcome = BroadcastOutcome::default();
        let mut dead = Vec::new();
        let mut sends = JoinSet::new();

        for session in snapshot {
            if !session.is_open() {
                dead.push(session);
                continue;
            }

            let frame = Arc::clone(&frame);
            sends.spawn(async move {
                let result = session.send_bytes(&frame).await;
                (session, result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => outcome.delivered += 1,
                Ok((session, Err(e))) => {
                    debug!("Dropping {} after failed send: {}", session.identity(), e);
                    dead.push(session);
                }
                Err(e) => warn!("Broadcast send task failed: {}", e),
            }
        }

        for session in dead {
            session.close().await;
            if self.remove_session(&session).await {
                outcome.dropped += 1;
            }
        }

        outcome
    }

    /// Drains the registry and closes every session, ignoring errors.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session<S>>> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            session.close().await;
        }

        if !drained.is_empty() {
            info!("Closed {} client sessions", drained.len());
        }
        drained.len()
    }

    /// Removes `session` only if its identity still maps to that very session.
    ///
    /// Used by paths that hold a session from an earlier snapshot, so a newer
    /// session registered under the same identity is never evicted.
    pub async fn remove_session(&self, session: &Arc<Session<S>>) -> bool {
        let remaining = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(session.identity()) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(session.identity());
                    sessions.len()
                }
                _ => return false,
            }
        };

        info!(
            "Client {} removed, remaining clients: {}",
            session.identity(),
            remaining
        );
        true
    }
}

impl<S: Transport> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
