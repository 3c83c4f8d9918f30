//! Heartbeat pacing and staleness detection
//!
//! The monitor itself holds no per-session state: staleness is derived from
//! the session's last-activity timestamp, which the reader refreshes on every
//! receive. The client checks on every heartbeat tick; the server can run the
//! same check over its registry when a client timeout is configured.

use crate::session::Session;
use crate::{HEARTBEAT_INTERVAL, STALE_TIMEOUT};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Stale { idle: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    interval: Duration,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn check<S>(&self, session: &Session<S>, now: Instant) -> Liveness {
        let idle = session.idle(now);
        if idle > self.timeout {
            Liveness::Stale { idle }
        } else {
            Liveness::Alive
        }
    }

    /// Interval whose first tick fires one period from now, not immediately.
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(HEARTBEAT_INTERVAL, STALE_TIMEOUT)
    }
}
