//! Client connection manager
//!
//! A single driver task owns the whole lifecycle:
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!                                 |                  |
//!                               fail        peer closed / error / stale
//!                                 v                  v
//!                          Reconnecting <------------+
//!                      (5s after a failed connect, 3s after a lost session)
//! ```
//!
//! Any state goes to `Disconnected` on shutdown. Because the retry wait is a
//! plain `sleep` inside the driver task, there is at most one pending retry
//! at any time and shutdown cancels it by ending the task.

use crate::connector::Connector;
use crate::consumer::PositionConsumer;
use log::{debug, info, trace, warn};
use shared::{
    Liveness, LivenessMonitor, Message, Position, Session, SessionError, CONNECT_RETRY_DELAY,
    HEARTBEAT_INTERVAL, RECONNECT_DELAY, SEND_TIMEOUT, STALE_TIMEOUT,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Reconnecting",
        };
        f.write_str(name)
    }
}

/// Timing settings for the connection manager
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Period of the heartbeat and staleness check
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is considered dead
    pub stale_timeout: Duration,
    /// Wait after a failed connect attempt
    pub connect_retry_delay: Duration,
    /// Wait after an established session was lost
    pub reconnect_delay: Duration,
    /// Upper bound for a single write to the server
    pub send_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            stale_timeout: STALE_TIMEOUT,
            connect_retry_delay: CONNECT_RETRY_DELAY,
            reconnect_delay: RECONNECT_DELAY,
            send_timeout: SEND_TIMEOUT,
        }
    }
}

/// Counters describing the connection history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub sessions_opened: u64,
    pub stale_timeouts: u64,
    pub positions_received: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    sessions_opened: AtomicU64,
    stale_timeouts: AtomicU64,
    positions_received: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ClientStats {
        ClientStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            stale_timeouts: self.stale_timeouts.load(Ordering::Relaxed),
            positions_received: self.positions_received.load(Ordering::Relaxed),
        }
    }
}

/// Why a connected session ended
enum SessionEnd {
    Shutdown,
    PeerClosed,
    Failed(SessionError),
}

pub struct ConnectionManager<C, P> {
    config: ClientConfig,
    connector: C,
    consumer: P,
    state_tx: watch::Sender<ConnectionState>,
    position_tx: watch::Sender<Option<Position>>,
    counters: Arc<Counters>,
}

impl<C: Connector, P: PositionConsumer> ConnectionManager<C, P> {
    pub fn new(config: ClientConfig, connector: C, consumer: P) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (position_tx, _) = watch::channel(None);

        Self {
            config,
            connector,
            consumer,
            state_tx,
            position_tx,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Starts connecting in the background and hands back the control handle.
    pub fn connect(self) -> ClientHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state_rx = self.state_tx.subscribe();
        let position_rx = self.position_tx.subscribe();
        let counters = Arc::clone(&self.counters);

        self.set_state(ConnectionState::Connecting);
        let task = tokio::spawn(self.run(shutdown_rx));

        ClientHandle {
            state_rx,
            position_rx,
            counters,
            shutdown_tx,
            task,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Connection state: {} -> {}", previous, state);
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            Counters::bump(&self.counters.connect_attempts);

            let attempt = tokio::select! {
                attempt = self.connector.connect() => attempt,
                _ = shutdown.changed() => break,
            };

            let delay = match attempt {
                Ok((stream, identity)) => {
                    match self.drive_session(stream, identity, &mut shutdown).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::PeerClosed => {
                            info!("Disconnected: server closed connection");
                        }
                        SessionEnd::Failed(e) => info!("Disconnected: {}", e),
                    }
                    self.config.reconnect_delay
                }
                Err(e) => {
                    Counters::bump(&self.counters.connect_failures);
                    warn!("Connection failed: {}", e);
                    self.config.connect_retry_delay
                }
            };

            self.set_state(ConnectionState::Reconnecting);
            info!("Reconnecting in {:.1}s", delay.as_secs_f32());

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Client shutting down");
    }

    /// Runs one connected session until it ends.
    ///
    /// Inbound frames, the heartbeat/staleness tick and the shutdown signal
    /// are multiplexed in one loop; the session is always closed on return.
    async fn drive_session(
        &self,
        stream: C::Stream,
        identity: String,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (session, mut reader) = Session::open(stream, identity, self.config.send_timeout);
        Counters::bump(&self.counters.sessions_opened);
        self.set_state(ConnectionState::Connected);
        info!("Client successfully connected to {}", session.identity());

        if let Err(e) = session.send(&Message::ClientConnected).await {
            session.close().await;
            return SessionEnd::Failed(e);
        }

        let monitor = LivenessMonitor::new(self.config.heartbeat_interval, self.config.stale_timeout);
        let mut heartbeat = monitor.ticker();

        let end = loop {
            tokio::select! {
                frame = reader.next_frame() => match frame {
                    Ok(Some(frame)) => self.handle_frame(&frame),
                    Ok(None) => break SessionEnd::PeerClosed,
                    Err(e) => break SessionEnd::Failed(e),
                },
                _ = heartbeat.tick() => match monitor.check(&session, Instant::now()) {
                    Liveness::Stale { idle } => {
                        Counters::bump(&self.counters.stale_timeouts);
                        warn!("No data received for {:.1} seconds", idle.as_secs_f32());
                        break SessionEnd::Failed(SessionError::Stale { idle });
                    }
                    Liveness::Alive => {
                        if let Err(e) = session.send(&Message::Heartbeat).await {
                            break SessionEnd::Failed(e);
                        }
                    }
                },
                _ = shutdown.changed() => {
                    if let Err(e) = session.send(&Message::ClientDisconnecting).await {
                        debug!("Could not announce disconnect: {}", e);
                    }
                    break SessionEnd::Shutdown;
                }
            }
        };

        session.close().await;
        end
    }

    fn handle_frame(&self, frame: &str) {
        match Message::parse(frame) {
            Ok(Message::Position(position)) => {
                debug!("Position updated: {}", position);
                Counters::bump(&self.counters.positions_received);
                self.position_tx.send_replace(Some(position));
                self.consumer.on_position(position);
            }
            Ok(Message::Heartbeat) => trace!("Heartbeat from server"),
            Ok(other) => debug!("Ignoring {} from server", other),
            Err(e) => warn!("Discarding message from server: {}", e),
        }
    }
}

/// Control handle for a running connection manager.
///
/// Dropping the handle without calling [`ClientHandle::shutdown`] also shuts
/// the connection down, without waiting for it.
pub struct ClientHandle {
    state_rx: watch::Receiver<ConnectionState>,
    position_rx: watch::Receiver<Option<Position>>,
    counters: Arc<Counters>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver for observing state changes, e.g. from a presentation layer
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Last position received from the server, if any
    pub fn position(&self) -> Option<Position> {
        *self.position_rx.borrow()
    }

    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }

    /// Waits until the manager reports `target`. Returns `false` if the
    /// manager stopped first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut state_rx = self.state_rx.clone();
        loop {
            if *state_rx.borrow_and_update() == target {
                return true;
            }
            if state_rx.changed().await.is_err() {
                return *state_rx.borrow() == target;
            }
        }
    }

    /// Announces the disconnect to the server, closes the session, cancels
    /// any pending retry and waits for the driver task to finish.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(e) = self.task.await {
            warn!("Connection task ended abnormally: {}", e);
        }
    }
}
