//! Channel Configuration
//!
//! Per-channel connection settings: endpoint, identity, timeouts, heartbeat
//! cadence, and reconnect/backoff parameters. Channels differ in criticality,
//! so each kind carries its own backoff floor and heartbeat interval.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of one logical duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// App-wide notification channel, kept alive across page navigation.
    Global,
    /// Channel scoped to a single discussion thread.
    Thread(i64),
    /// Site-wide broadcast banner channel.
    Broadcast,
    /// Quick-reply popup channel.
    QuickReply,
}

impl ChannelKind {
    /// URL path segment for this channel's endpoint.
    pub fn path(&self) -> String {
        match self {
            Self::Global => "/ws/notifications".to_string(),
            Self::Thread(id) => format!("/ws/thread/{}", id),
            Self::Broadcast => "/ws/broadcast".to_string(),
            Self::QuickReply => "/ws/quick-reply".to_string(),
        }
    }

    /// Thread id for thread-scoped channels.
    pub fn thread_id(&self) -> Option<i64> {
        match self {
            Self::Thread(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this channel asks the server for its state on open. Only the
    /// broadcast channel requests a replay (`get_active_broadcast`); the
    /// global channel gets its snapshot pushed as `initial_data`.
    pub fn wants_replay(&self) -> bool {
        matches!(self, Self::Broadcast)
    }

    /// Backoff floor by criticality: the global counter channel retries
    /// fastest, popup channels can afford to wait.
    pub fn default_backoff_base_ms(&self) -> u64 {
        match self {
            Self::Global | Self::Thread(_) => 1_000,
            Self::Broadcast | Self::QuickReply => 5_000,
        }
    }

    /// Heartbeat interval by kind.
    pub fn default_heartbeat_interval_ms(&self) -> u64 {
        match self {
            Self::Global | Self::Broadcast => 30_000,
            Self::Thread(_) | Self::QuickReply => 25_000,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Thread(_) => "thread",
            Self::Broadcast => "broadcast",
            Self::QuickReply => "quick-reply",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "thread({})", id),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Configuration for one channel connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// WebSocket endpoint base, e.g. `wss://example.com`.
    pub endpoint: String,

    /// Which logical channel this connection carries.
    pub kind: ChannelKind,

    /// Session identifier carried as a URL query parameter. Authentication
    /// happens at connection establishment; there is no handshake message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// User id carried as a URL query parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// Connection-open timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Heartbeat ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// How long to wait for a pong after a ping, in milliseconds.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,

    /// Initial reconnect delay in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,

    /// Maximum reconnect attempts before entering the failed state.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Jitter factor applied to reconnect delays (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_pong_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    6
}

fn default_jitter() -> f64 {
    0.1
}

impl ChannelConfig {
    /// Create a configuration for the given channel kind with per-kind
    /// defaults for backoff and heartbeat.
    pub fn for_kind(endpoint: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
            session_token: None,
            user_id: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: kind.default_heartbeat_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            reconnect_base_ms: kind.default_backoff_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            jitter: default_jitter(),
        }
    }

    /// Set the session token carried in the connection URL.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Set the user id carried in the connection URL.
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Full connection URL including channel identity and session identity
    /// as query parameters.
    pub fn connection_url(&self) -> String {
        let mut url = format!("{}{}", self.endpoint, self.kind.path());
        let mut sep = '?';
        if let Some(token) = &self.session_token {
            url.push(sep);
            url.push_str(&format!("session={}", token));
            sep = '&';
        }
        if let Some(user_id) = self.user_id {
            url.push(sep);
            url.push_str(&format!("user_id={}", user_id));
        }
        url
    }

    /// Connection-open timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Heartbeat interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Pong deadline as a Duration.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}
