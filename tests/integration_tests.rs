//! Integration tests for the position server and client
//!
//! These tests run the real server and client against each other over
//! loopback TCP.

use client::{ClientConfig, ClientHandle, ConnectionManager, ConnectionState, TcpConnector};
use server::network::{Server, ServerConfig, ServerHandle};
use shared::protocol::CLIENT_CONNECTED;
use shared::Position;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// END-TO-END TESTS
mod end_to_end_tests {
    use super::*;

    /// Tests that a client sees the initial position and every tick after it
    #[tokio::test]
    async fn client_follows_server_ticks() {
        let server = start_server().await;
        let (seen, client) = start_client(server.local_addr(), ClientConfig::default());

        wait_until(|| async { server.session_count().await == 1 }).await;
        wait_until(|| async { client.position() == Some(Position::new(20, 20)) }).await;

        assert_eq!(server.tick().await, Position::new(30, 20));
        assert_eq!(server.tick().await, Position::new(40, 20));
        wait_until(|| async { client.position() == Some(Position::new(40, 20)) }).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Position::new(20, 20),
                Position::new(30, 20),
                Position::new(40, 20)
            ]
        );
        assert_eq!(client.state(), ConnectionState::Connected);

        client.shutdown().await;
        server.shutdown().await;
    }

    /// Tests that every connected client receives the same broadcast
    #[tokio::test]
    async fn broadcast_reaches_all_clients() {
        let server = start_server().await;
        let clients: Vec<_> = (0..3)
            .map(|_| start_client(server.local_addr(), ClientConfig::default()))
            .collect();

        wait_until(|| async { server.session_count().await == 3 }).await;
        let position = server.tick().await;

        for (_, client) in &clients {
            wait_until(|| async { client.position() == Some(position) }).await;
        }

        for (_, client) in clients {
            client.shutdown().await;
        }
        server.shutdown().await;
    }

    /// Tests that a client shutting down is removed from the server
    #[tokio::test]
    async fn client_shutdown_leaves_registry() {
        let server = start_server().await;
        let (_, client) = start_client(server.local_addr(), ClientConfig::default());
        wait_until(|| async { server.session_count().await == 1 }).await;

        client.shutdown().await;
        wait_until(|| async { server.session_count().await == 0 }).await;

        server.shutdown().await;
    }

    /// Tests that a client keeps retrying after the server goes away
    #[tokio::test]
    async fn client_retries_after_server_shutdown() {
        let server = start_server().await;
        let (_, client) = start_client(server.local_addr(), fast_retry_config());
        assert!(timeout(WAIT, client.wait_for_state(ConnectionState::Connected))
            .await
            .unwrap());

        server.shutdown().await;

        wait_until(|| async { client.stats().connect_failures >= 2 }).await;
        assert_ne!(client.state(), ConnectionState::Connected);
        assert_eq!(client.stats().sessions_opened, 1);

        client.shutdown().await;
    }
}

/// RECONNECTION TESTS
mod reconnection_tests {
    use super::*;

    /// Tests that a client whose connection is dropped comes back on its own
    #[tokio::test]
    async fn client_reconnects_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_, client) = start_client(addr, fast_retry_config());

        let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut lines = BufReader::new(stream).lines();
        let first = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some(CLIENT_CONNECTED));
        drop(lines);

        let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let mut lines = BufReader::new(stream).lines();
        let first = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some(CLIENT_CONNECTED));

        assert_eq!(client.stats().sessions_opened, 2);
        client.shutdown().await;
    }

    /// Tests that a client started before the server connects once it appears
    #[tokio::test]
    async fn client_connects_to_late_server() {
        // Reserve a port, then free it so the first attempts are refused.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let (_, client) = start_client(addr, fast_retry_config());
        wait_until(|| async { client.stats().connect_failures >= 1 }).await;

        let server = Server::bind(ServerConfig {
            bind_addr: addr.to_string(),
            ..server_config()
        })
        .await
        .unwrap()
        .start();

        wait_until(|| async { client.position() == Some(Position::new(20, 20)) }).await;
        assert_eq!(server.session_count().await, 1);

        client.shutdown().await;
        server.shutdown().await;
    }
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that frames split across writes are reassembled by the server
    #[tokio::test]
    async fn server_reassembles_split_frames() {
        let server = start_server().await;
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let initial = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(initial.as_deref(), Some("20,20"));

        write_half.write_all(b"CLIENT_CONN").await.unwrap();
        sleep(Duration::from_millis(20)).await;
        write_half
            .write_all(b"ECTED\nHEARTBEAT\nnot a message\n1,2\n")
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        // Nothing in there is fatal; the session survives and keeps receiving.
        assert_eq!(server.session_count().await, 1);
        server.tick().await;
        let next = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(next.as_deref(), Some("30,20"));

        server.shutdown().await;
        let end = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
        assert_eq!(end, None);
    }
}

fn server_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        // Ticks are driven by hand through the handle.
        tick_interval: Duration::from_secs(3600),
        ..ServerConfig::default()
    }
}

fn fast_retry_config() -> ClientConfig {
    ClientConfig {
        connect_retry_delay: Duration::from_millis(50),
        reconnect_delay: Duration::from_millis(50),
        ..ClientConfig::default()
    }
}

async fn start_server() -> ServerHandle {
    Server::bind(server_config()).await.unwrap().start()
}

fn start_client(addr: SocketAddr, config: ClientConfig) -> (Arc<Mutex<Vec<Position>>>, ClientHandle) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let connector = TcpConnector::new(addr, WAIT);
    let consumer = move |pos: Position| sink.lock().unwrap().push(pos);
    let handle = ConnectionManager::new(config, connector, consumer).connect();
    (seen, handle)
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !condition().await {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
