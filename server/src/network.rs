//! Server network layer: accept path, tick loop and per-session receive tasks

use crate::registry::{BroadcastOutcome, SessionRegistry};
use crate::world::{World, WorldError};
use log::{debug, info, trace, warn};
use shared::{
    ConnectError, Liveness, LivenessMonitor, Message, Position, Session, SessionReader,
    AREA_WIDTH, DEFAULT_PORT, HEARTBEAT_INTERVAL, SEND_TIMEOUT, TICK_INTERVAL,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Reasons a server cannot be brought up
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("invalid world configuration: {0}")]
    World(#[from] WorldError),
}

/// Runtime settings for the broadcast server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:1111`
    pub bind_addr: String,
    /// Period between position advances
    pub tick_interval: Duration,
    /// Width of the area the object bounces in
    pub area_width: i32,
    /// Upper bound for a single write to a client
    pub send_timeout: Duration,
    /// Drop clients that sent nothing for this long. Off when `None`.
    pub client_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            tick_interval: TICK_INTERVAL,
            area_width: AREA_WIDTH,
            send_timeout: SEND_TIMEOUT,
            client_timeout: None,
        }
    }
}

/// State shared by the accept, tick and receive tasks
struct ServerContext {
    registry: SessionRegistry,
    world: RwLock<World>,
    config: ServerConfig,
}

impl ServerContext {
    /// Advances the object one step and pushes the new position to everyone.
    async fn tick(&self) -> Position {
        let (position, tick) = {
            let mut world = self.world.write().await;
            let position = world.advance();
            (position, world.tick())
        };

        let outcome = self.registry.broadcast_position(position).await;

        if tick % 100 == 0 || outcome.dropped > 0 {
            let BroadcastOutcome { delivered, dropped } = outcome;
            debug!(
                "Tick {}: position {}, delivered to {} clients, dropped {}",
                tick, position, delivered, dropped
            );
        }

        position
    }

    async fn handle_connection(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let (session, reader) = Session::open(stream, addr.to_string(), self.config.send_timeout);

        // The current position goes out before the session is registered, so
        // no broadcast can overtake it with a newer one.
        let position = self.world.read().await.position();
        if let Err(e) = session.send(&Message::Position(position)).await {
            warn!("Failed to send initial position to {}: {}", addr, e);
            return;
        }

        if let Some(previous) = self.registry.add(Arc::clone(&session)).await {
            previous.close().await;
        }

        tokio::spawn(Arc::clone(self).receive_loop(reader));
    }

    /// Reads frames from one client until the session ends, then unregisters it.
    async fn receive_loop(self: Arc<Self>, mut reader: SessionReader) {
        let session = Arc::clone(reader.session());

        let reason = loop {
            match reader.next_frame().await {
                Ok(Some(frame)) => self.handle_frame(&session, &frame),
                Ok(None) if session.is_open() => {
                    break "client disconnected gracefully".to_string();
                }
                Ok(None) => break "session closed".to_string(),
                Err(e) => break format!("receive error: {}", e),
            }
        };

        session.close().await;
        if self.registry.remove_session(&session).await {
            info!("Client {} disconnected: {}", session.identity(), reason);
        }
    }

    fn handle_frame(&self, session: &Session, frame: &str) {
        let id = session.identity();
        match Message::parse(frame) {
            Ok(Message::Heartbeat) => trace!("Heartbeat from {}", id),
            Ok(Message::ClientConnected) => info!("Client {} reports connected", id),
            Ok(Message::ClientDisconnecting) => info!("Client {} reports disconnecting", id),
            Ok(Message::Position(pos)) => debug!("Ignoring position {} sent by {}", pos, id),
            Err(e) => warn!("Discarding message from {}: {}", id, e),
        }
    }

    /// Closes and unregisters every session that has been silent too long.
    async fn reap_stale(&self, monitor: &LivenessMonitor) -> usize {
        let now = Instant::now();
        let mut reaped = 0;

        for session in self.registry.snapshot().await {
            if let Liveness::Stale { idle } = monitor.check(&session, now) {
                warn!(
                    "Client {} silent for {:.1}s, dropping",
                    session.identity(),
                    idle.as_secs_f32()
                );
                session.close().await;
                if self.registry.remove_session(&session).await {
                    reaped += 1;
                }
            }
        }

        reaped
    }
}

/// A bound but not yet running server
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    world: World,
    config: ServerConfig,
}

impl Server {
    /// Validates the world settings and binds the listening socket. Failure
    /// here is fatal; there is no retry.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let world = World::new(config.area_width)?;

        let bind_error = |source| ConnectError::Bind {
            addr: config.bind_addr.clone(),
            source,
        };

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!("Server listening on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
            world,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the accept loop, the tick loop and, if configured, the
    /// stale-client reaper.
    pub fn start(self) -> ServerHandle {
        let context = Arc::new(ServerContext {
            registry: SessionRegistry::new(),
            world: RwLock::new(self.world),
            config: self.config,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![
            tokio::spawn(accept_loop(
                self.listener,
                Arc::clone(&context),
                shutdown_rx.clone(),
            )),
            tokio::spawn(tick_loop(Arc::clone(&context), shutdown_rx.clone())),
        ];

        if let Some(timeout) = context.config.client_timeout {
            let monitor = LivenessMonitor::new(HEARTBEAT_INTERVAL.min(timeout), timeout);
            tasks.push(tokio::spawn(reap_loop(
                Arc::clone(&context),
                monitor,
                shutdown_rx,
            )));
        }

        info!("Server started successfully");
        ServerHandle {
            context,
            local_addr: self.local_addr,
            shutdown_tx,
            tasks,
        }
    }
}

/// Control handle for a running server.
///
/// Dropping the handle without calling [`ServerHandle::shutdown`] also stops
/// the server and disconnects every client, without waiting for it.
pub struct ServerHandle {
    context: Arc<ServerContext>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to, with the real port when the
    /// configuration asked for port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of clients currently registered
    pub async fn session_count(&self) -> usize {
        self.context.registry.count().await
    }

    /// Position the object is at right now
    pub async fn position(&self) -> Position {
        self.context.world.read().await.position()
    }

    /// Runs one tick immediately, independent of the tick loop.
    pub async fn tick(&self) -> Position {
        self.context.tick().await
    }

    /// Stops accepting, stops ticking and closes every session.
    pub async fn shutdown(self) {
        info!("Server shutting down");
        self.shutdown_tx.send_replace(true);

        // The accept loop closes the sessions on its way out.
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Server task ended abnormally: {}", e);
            }
        }

        info!("Server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ServerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => context.handle_connection(stream, addr).await,
                Err(e) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    warn!("Accept error: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("Stopped accepting connections");

    // Also reached when the handle is dropped, since the closed channel ends
    // the loop. No session can be added after this point.
    context.registry.close_all().await;
}

async fn tick_loop(context: Arc<ServerContext>, mut shutdown: watch::Receiver<bool>) {
    let period = context.config.tick_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                context.tick().await;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Tick loop stopped");
}

async fn reap_loop(
    context: Arc<ServerContext>,
    monitor: LivenessMonitor,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = monitor.ticker();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reaped = context.reap_stale(&monitor).await;
                if reaped > 0 {
                    info!("Dropped {} stale clients", reaped);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
