//! Channel connection state machine.
//!
//! `disconnected → connecting → connected → {disconnected | reconnecting →
//! connecting}`, with a terminal-ish `failed` state entered only after the
//! reconnect budget is exhausted. `force_reconnect` is the only exit from
//! `failed`.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Observable connection state for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Socket opening in progress.
    Connecting,
    /// Live connection.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Reconnect budget exhausted; only `force_reconnect` leaves this state.
    Failed,
}

impl ConnectionState {
    /// Returns true if the connection is live.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true while a connect attempt is pending or scheduled.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of asking for another reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule attempt number `attempt` (1-based).
    Retry { attempt: u32 },
    /// Budget exhausted; the channel is now `Failed`.
    GiveUp,
}

/// Internal bookkeeping for one channel connection.
#[derive(Debug)]
pub struct InternalState {
    /// Current connection state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Set by a manual disconnect; suppresses automatic reconnection.
    pub manual_close: bool,
    /// Last successful open.
    pub last_connected: Option<Instant>,
    /// Last heartbeat ping sent.
    pub last_ping: Option<Instant>,
    /// Last pong received.
    pub last_pong: Option<Instant>,
    /// Whether a pong is outstanding.
    pub awaiting_pong: bool,
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            manual_close: false,
            last_connected: None,
            last_ping: None,
            last_pong: None,
            awaiting_pong: false,
        }
    }
}

impl InternalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard for `connect()`: transitions to `Connecting` and returns true
    /// only from `Disconnected`. Calling connect while already connecting,
    /// connected, reconnecting, or failed is a no-op, so at most one socket
    /// attempt is ever in flight.
    pub fn begin_connect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        self.manual_close = false;
        true
    }

    /// Transition `Reconnecting → Connecting` when a scheduled attempt fires.
    pub fn resume_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Marks a successful open: attempts reset, heartbeat bookkeeping cleared.
    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.last_connected = Some(Instant::now());
        self.awaiting_pong = false;
    }

    /// Marks a lost connection (close or error); reconnect may follow.
    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.awaiting_pong = false;
    }

    /// Marks an intentional teardown; automatic reconnection stays off until
    /// the next explicit connect.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.manual_close = true;
        self.awaiting_pong = false;
    }

    /// Asks for another reconnect attempt against the given budget. Exceeding
    /// the budget transitions to `Failed`.
    pub fn begin_reconnect(&mut self, max_attempts: u32) -> ReconnectDecision {
        self.reconnect_attempts += 1;
        if self.reconnect_attempts > max_attempts {
            self.state = ConnectionState::Failed;
            ReconnectDecision::GiveUp
        } else {
            self.state = ConnectionState::Reconnecting;
            ReconnectDecision::Retry {
                attempt: self.reconnect_attempts,
            }
        }
    }

    /// The only exit from `Failed`: reset the budget and allow a fresh
    /// `begin_connect`.
    pub fn reset_for_reconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.reconnect_attempts = 0;
        self.manual_close = false;
        self.awaiting_pong = false;
    }

    /// Records that a heartbeat ping was sent at `now`.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
        self.awaiting_pong = true;
    }

    /// Records that a pong arrived at `now`.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
        self.awaiting_pong = false;
    }

    /// Whether the outstanding ping has gone unanswered past `timeout`.
    /// Catches half-open TCP connections that never signal close.
    pub fn pong_overdue(&self, now: Instant, timeout: Duration) -> bool {
        match (self.awaiting_pong, self.last_ping) {
            (true, Some(sent)) => now.duration_since(sent) >= timeout,
            _ => false,
        }
    }
}
