use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use shared::DEFAULT_PORT;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Milliseconds between position updates
    #[arg(short, long, default_value = "50")]
    tick_ms: u64,

    /// Width of the area the object bounces in
    #[arg(short = 'w', long, default_value = "800")]
    area_width: i32,

    /// Drop clients silent for this many seconds (disabled when omitted)
    #[arg(long)]
    client_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        area_width: args.area_width,
        client_timeout: args.client_timeout.map(Duration::from_secs),
        ..ServerConfig::default()
    };

    info!("Starting server...");
    let handle = Server::bind(config).await?.start();
    info!("Waiting for client connections on port {}", handle.local_addr().port());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    handle.shutdown().await;

    Ok(())
}
