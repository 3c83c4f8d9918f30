//! # Position Broadcast Server
//!
//! The server owns a single moving rectangle. On every tick it advances the
//! rectangle with a simple bounce rule and pushes the new position to every
//! connected client over TCP.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Tracks the live client sessions:
//! - registration on accept, idempotent removal on disconnect
//! - broadcast from a snapshot so no I/O runs under the lock
//! - deferred removal of sessions whose send failed
//!
//! ### World Module (`world`)
//! The rectangle's position and the bounce rule that moves it.
//!
//! ### Network Module (`network`)
//! Listener, accept path, tick loop and per-client receive tasks, plus an
//! optional reaper for clients that went silent.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = Server::bind(ServerConfig::default()).await?.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! Accepting, ticking and each client's receive path are separate tokio
//! tasks. They share the registry and the world; neither lock is held across
//! network I/O. A client that stops reading only delays the tick that writes
//! to it, bounded by the send timeout, after which it is dropped.

pub mod network;
pub mod registry;
pub mod world;
