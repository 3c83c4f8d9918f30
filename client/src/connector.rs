//! How the connection manager obtains a fresh stream for each attempt

use log::info;
use shared::{ConnectError, Transport};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

/// Source of new connections.
///
/// Each call is one connection attempt. On success it yields the stream and
/// the identity the resulting session is known by.
pub trait Connector: Send + Sync + 'static {
    type Stream: Transport;

    fn connect(
        &self,
    ) -> impl Future<Output = Result<(Self::Stream, String), ConnectError>> + Send;
}

/// Plain TCP connector with a bounded connect time
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<(TcpStream, String), ConnectError> {
        info!("Attempting to connect to {}...", self.addr);

        let stream = match timeout(self.timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ConnectError::Connect {
                    addr: self.addr,
                    source,
                })
            }
            Err(_) => {
                return Err(ConnectError::Timeout {
                    addr: self.addr,
                    timeout: self.timeout,
                })
            }
        };

        // Position updates are tiny; do not let Nagle batch them.
        let _ = stream.set_nodelay(true);
        Ok((stream, self.addr.to_string()))
    }
}

/// Resolves `host:port` and picks the first IPv4 address.
pub async fn resolve_ipv4(host: &str) -> Result<SocketAddr, ConnectError> {
    let resolve_error = |source| ConnectError::Resolve {
        host: host.to_string(),
        source,
    };

    lookup_host(host)
        .await
        .map_err(resolve_error)?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            resolve_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no IPv4 address found",
            ))
        })
}
