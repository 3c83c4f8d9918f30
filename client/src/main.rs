use clap::Parser;
use client::{resolve_ipv4, ClientConfig, ConnectionManager, ConnectionState, TcpConnector};
use log::info;
use shared::{Position, CONNECT_TIMEOUT, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Milliseconds between heartbeats
    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,

    /// Seconds of silence before the connection is considered lost
    #[arg(long, default_value = "10")]
    stale_secs: u64,

    /// Seconds to wait after a failed connection attempt
    #[arg(long, default_value = "5")]
    retry_secs: u64,

    /// Seconds to wait before reconnecting after a lost connection
    #[arg(long, default_value = "3")]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        heartbeat_interval: Duration::from_millis(args.heartbeat_ms.max(1)),
        stale_timeout: Duration::from_secs(args.stale_secs),
        connect_retry_delay: Duration::from_secs(args.retry_secs),
        reconnect_delay: Duration::from_secs(args.reconnect_secs),
        ..ClientConfig::default()
    };

    info!("Starting client...");
    let addr = resolve_ipv4(&args.server).await?;
    info!("Connecting to: {}", addr);

    let connector = TcpConnector::new(addr, CONNECT_TIMEOUT);
    let handle = ConnectionManager::new(config, connector, |_: Position| {}).connect();

    let mut status = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = status.tick() => {
                match (handle.state(), handle.position()) {
                    (ConnectionState::Connected, Some(pos)) => {
                        info!("{} | Position: {}", ConnectionState::Connected, pos)
                    }
                    (state, _) => info!("{}", state),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    info!("Received Ctrl+C, shutting down gracefully...");
    handle.shutdown().await;

    Ok(())
}
