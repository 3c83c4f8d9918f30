//! Raw protocol probe: connects to a server, prints the frames it receives
//! and answers with heartbeats, without any reconnect logic.

use clap::Parser;
use shared::{Message, Session, CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, SEND_TIMEOUT};
use tokio::net::TcpStream;
use tokio::time::{interval, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the frames a position server sends")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1111")]
    server: String,

    /// Number of frames to print before disconnecting
    #[arg(short, long, default_value = "20")]
    count: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to {}", args.server);
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&args.server)).await??;
    let peer = stream.peer_addr()?;
    let (session, mut reader) = Session::open(stream, peer.to_string(), SEND_TIMEOUT);
    println!("Connected to {}", peer);

    session.send(&Message::ClientConnected).await?;

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut received = 0;

    while received < args.count {
        tokio::select! {
            frame = reader.next_frame() => match frame? {
                Some(frame) => {
                    received += 1;
                    match Message::parse(&frame) {
                        Ok(message) => println!("[{}] {:?}", received, message),
                        Err(e) => println!("[{}] unparsed {:?}: {}", received, frame, e),
                    }
                }
                None => {
                    println!("Server closed the connection");
                    return Ok(());
                }
            },
            _ = heartbeat.tick() => {
                session.send(&Message::Heartbeat).await?;
            }
        }
    }

    let _ = session.send(&Message::ClientDisconnecting).await;
    session.close().await;
    println!("Disconnected after {} frames", received);

    Ok(())
}
