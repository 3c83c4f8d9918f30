//! A single connection and its liveness state
//!
//! [`Session::open`] splits the stream in two:
//! - the [`Session`] keeps the write half behind an async mutex, so sends from
//!   different tasks are serialized and delivered in the order issued
//! - the [`SessionReader`] owns the read half and is driven by exactly one
//!   receive loop
//!
//! Both halves share the open flag and the last-activity timestamp. Closing is
//! idempotent: only the first [`Session::close`] shuts the write half down and
//! wakes a reader blocked on the stream.

use crate::error::SessionError;
use crate::framing::{encode_frame, FrameDecoder};
use crate::protocol::Message;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::{timeout, Instant};

const READ_BUFFER_SIZE: usize = 1024;

/// Any bidirectional byte stream a session can run on
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub struct Session<S = TcpStream> {
    /// Peer address string, fixed for the life of the session
    identity: String,
    writer: Mutex<Option<WriteHalf<S>>>,
    open: AtomicBool,
    /// Updated by the reader on every successful receive
    last_activity: std::sync::Mutex<Instant>,
    closed_tx: watch::Sender<bool>,
    send_timeout: Duration,
}

impl<S: Transport> Session<S> {
    /// Wraps an established stream.
    ///
    /// Returns the shared session handle used for sending and closing, and the
    /// reader that the receive loop drives.
    pub fn open(
        stream: S,
        identity: impl Into<String>,
        send_timeout: Duration,
    ) -> (Arc<Self>, SessionReader<S>) {
        let (read_half, write_half) = split(stream);
        let (closed_tx, closed_rx) = watch::channel(false);

        let session = Arc::new(Self {
            identity: identity.into(),
            writer: Mutex::new(Some(write_half)),
            open: AtomicBool::new(true),
            last_activity: std::sync::Mutex::new(Instant::now()),
            closed_tx,
            send_timeout,
        });

        let reader = SessionReader {
            session: Arc::clone(&session),
            read_half,
            decoder: FrameDecoder::new(),
            closed: closed_rx,
            buffer: vec![0u8; READ_BUFFER_SIZE],
        };

        debug!("Session {} opened", session.identity);
        (session, reader)
    }

    pub async fn send(&self, message: &Message) -> Result<(), SessionError> {
        self.send_bytes(&encode_frame(message)).await
    }

    /// Writes pre-encoded bytes.
    ///
    /// Any failure, including the write not finishing within the send timeout,
    /// closes the session before the error is returned.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }

        let result = {
            let mut writer = self.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                return Err(SessionError::Closed);
            };

            let write = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            };
            match timeout(self.send_timeout, write).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SessionError::Io(e)),
                Err(_) => Err(SessionError::SendTimeout(self.send_timeout)),
            }
        };

        match &result {
            Ok(()) => trace!("Sent {} bytes to {}", bytes.len(), self.identity),
            Err(e) => {
                debug!("Send to {} failed: {}", self.identity, e);
                self.close().await;
            }
        }
        result
    }

    /// Closes the session. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }

        self.closed_tx.send_replace(true);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            // Peer may already be gone; the shutdown result does not matter.
            let _ = timeout(self.send_timeout, writer.shutdown()).await;
        }

        debug!("Session {} closed", self.identity);
        true
    }
}

impl<S> Session<S> {
    /// Peer address string the session was opened with.
    ///
    /// Doubles as the registry key on the server. A reconnect opens a new
    /// session and may get a different identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// `false` once [`Session::close`] ran, whether called directly or after
    /// a failed send. A closed session never reopens.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Marks the session as active now.
    ///
    /// The reader calls this on every successful receive; a peer that only
    /// sends heartbeats therefore stays fresh.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    /// Instant of the last successful receive, or of opening if nothing has
    /// arrived yet
    pub fn last_activity(&self) -> Instant {
        match self.last_activity.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Time elapsed since the last successful receive
    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.idle(now) > timeout
    }
}

/// Receiving half of a session
pub struct SessionReader<S = TcpStream> {
    session: Arc<Session<S>>,
    read_half: ReadHalf<S>,
    decoder: FrameDecoder,
    closed: watch::Receiver<bool>,
    buffer: Vec<u8>,
}

impl<S: Transport> SessionReader<S> {
    pub fn session(&self) -> &Arc<Session<S>> {
        &self.session
    }

    /// Waits for the next complete frame.
    ///
    /// `Ok(None)` means the stream ended: the peer closed gracefully or the
    /// session was closed locally. Errors leave closing to the caller.
    ///
    /// Cancel safe: dropping the future never loses received bytes, so it can
    /// be raced against timers in `tokio::select!`.
    pub async fn next_frame(&mut self) -> Result<Option<String>, SessionError> {
        loop {
            if *self.closed.borrow() {
                return Ok(None);
            }
            if let Some(frame) = self.decoder.next_frame()? {
                trace!("Frame from {}: {}", self.session.identity, frame);
                return Ok(Some(frame));
            }

            tokio::select! {
                read = self.read_half.read(&mut self.buffer) => {
                    match read? {
                        0 => return Ok(None),
                        n => {
                            self.session.touch();
                            self.decoder.extend(&self.buffer[..n]);
                        }
                    }
                }
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}
