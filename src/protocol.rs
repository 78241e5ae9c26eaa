//! Wire Protocol
//!
//! JSON text frames exchanged over a channel. Inbound events are a tagged
//! union discriminated by the `type` field; outbound messages mirror the
//! same convention. One wire message becomes exactly one [`InboundEvent`],
//! consumed once by the dispatcher and then discarded.

use serde::{Deserialize, Serialize};

/// One notification item as pushed by the server or returned by the
/// snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Server-issued notification id.
    pub id: i64,
    /// Thread this notification belongs to, when thread-attributable.
    #[serde(default)]
    pub thread_id: Option<i64>,
    /// Content domain, e.g. `"forum"`. Only forum notifications count
    /// toward thread unread totals.
    #[serde(default)]
    pub domain: Option<String>,
    /// Whether the notification has already been read.
    #[serde(default)]
    pub is_read: bool,
    /// Short preview text for popups.
    #[serde(default)]
    pub excerpt: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl NotificationPayload {
    /// Whether this notification counts toward forum unread totals.
    pub fn counts_toward_unread(&self) -> bool {
        !self.is_read && self.domain.as_deref() == Some("forum") && self.thread_id.is_some()
    }
}

/// A site-wide broadcast banner pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    /// Server-issued broadcast id, used for acknowledgement.
    pub id: i64,
    /// Banner text.
    pub message: String,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Authoritative count correction pushed by the server. Any subset of the
/// fields may be present; a per-thread count of zero means "remove entry".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountCorrection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_unread_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_forum_unread: Option<u32>,
}

/// Server-pushed event, deserialized from one JSON text frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Connection acknowledged by the server.
    Connected {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// A new notification arrived.
    NewNotification { notification: NotificationPayload },
    /// A single notification was read (possibly in another tab).
    NotificationRead { thread_id: i64 },
    /// Authoritative unread-count correction.
    UnreadCountUpdated(#[serde(default)] CountCorrection),
    /// Snapshot of current notifications, sent once per connection open.
    InitialData {
        #[serde(default)]
        notifications: Vec<NotificationPayload>,
    },
    /// A whole thread was marked read, possibly by another session.
    ThreadMarkedRead { thread_id: i64, user_id: i64 },
    /// A new broadcast banner is active.
    NewBroadcast { broadcast: BroadcastPayload },
    /// The active broadcast was cleared server-side.
    BroadcastCleared,
    /// Server-initiated liveness probe; answered with `heartbeat_ack`.
    Heartbeat,
    /// Reply to a client `ping`.
    Pong,
}

impl InboundEvent {
    /// Event type tags this client understands. Anything else is logged
    /// and dropped by the dispatcher.
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "connected",
        "new_notification",
        "notification_read",
        "unread_count_updated",
        "initial_data",
        "thread_marked_read",
        "new_broadcast",
        "broadcast_cleared",
        "heartbeat",
        "pong",
    ];
}

/// Client-to-server message, serialized as one JSON text frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Heartbeat probe; the server answers with `pong`.
    Ping,
    /// Answer to a server-initiated `heartbeat`.
    HeartbeatAck,
    /// Request the currently active broadcast after (re)connect.
    GetActiveBroadcast,
    /// Acknowledge a broadcast so it is not shown again.
    AcknowledgeBroadcast { broadcast_id: i64 },
    /// Typing indicator for the quick-reply channel.
    Typing { is_typing: bool },
}

impl OutboundMessage {
    /// Serialize to a JSON text frame.
    pub fn to_frame(&self) -> Result<String, crate::error::PulseError> {
        Ok(serde_json::to_string(self)?)
    }
}
