//! # Position Client Library
//!
//! Keeps a TCP connection to the position server alive and hands every
//! position it receives to a consumer.
//!
//! ## Module Organization
//!
//! ### Connector Module (`connector`)
//! Produces a fresh stream for each connection attempt. [`TcpConnector`]
//! bounds the connect time; tests plug in in-memory streams instead.
//!
//! ### Consumer Module (`consumer`)
//! The [`PositionConsumer`] contract through which positions leave the
//! connection task. Any `Fn(Position)` closure qualifies.
//!
//! ### Network Module (`network`)
//! The [`ConnectionManager`] state machine: connect, heartbeat, staleness
//! detection and delayed reconnects, plus the [`ClientHandle`] used to watch
//! and stop it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{ClientConfig, ConnectionManager, TcpConnector};
//! use shared::{Position, CONNECT_TIMEOUT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = client::resolve_ipv4("127.0.0.1:1111").await?;
//!     let connector = TcpConnector::new(addr, CONNECT_TIMEOUT);
//!     let consumer = |pos: Position| println!("object at {}", pos);
//!
//!     let handle = ConnectionManager::new(ClientConfig::default(), connector, consumer).connect();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod connector;
pub mod consumer;
pub mod network;

pub use connector::{resolve_ipv4, Connector, TcpConnector};
pub use consumer::PositionConsumer;
pub use network::{ClientConfig, ClientHandle, ClientStats, ConnectionManager, ConnectionState};
