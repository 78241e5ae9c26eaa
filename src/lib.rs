//! ForumPulse - Realtime Notification Core
//!
//! ForumPulse is the realtime notification and presence layer for a content
//! platform's discussion forums: live unread counters, quick-reply popups,
//! and site-wide broadcast banners over per-purpose WebSocket channels.
//!
//! # Overview
//!
//! This library provides the client-side core:
//! - Channel lifecycle: connect, heartbeat, reconnect with capped backoff
//! - Unread-count reconciliation with optimistic mark-read and rollback
//! - Typed inbound event dispatch from JSON text frames
//! - Presence tracking that suppresses counts for visible content
//! - Ephemeral popup control with acknowledgement persistence
//!
//! # Module Structure
//!
//! - **`connection`** - Per-channel socket lifecycle state machine
//! - **`protocol`** - Wire-format types for inbound events and outbound
//!   messages
//! - **`dispatch`** - Frame parsing and event routing
//! - **`unread`** - Per-thread unread ledger and derived aggregate
//! - **`presence`** - What the user is currently looking at
//! - **`popup`** - Quick-reply popups and broadcast banners
//! - **`api`** - REST collaborators (mark-read confirmation, snapshot
//!   fetch, quick replies)
//! - **`session`** - The facade the UI drives once per frame
//!
//! # Usage
//!
//! ```rust,no_run
//! use forumpulse::session::{NotificationSession, SessionConfig};
//! use std::time::Instant;
//!
//! # async fn example() {
//! let config = SessionConfig::new("https://example.com", "wss://example.com")
//!     .with_identity("session-token", 42);
//! let mut session = NotificationSession::new(config);
//! session.start();
//!
//! // Once per UI frame:
//! if session.pump(Instant::now()) {
//!     // re-render unread badges and popups
//! }
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Connection supervisors run as Tokio tasks and communicate with the
//! session through channels; the session itself is single-threaded and
//! driven by the caller's frame loop.

/// Error taxonomy for the notification core
pub mod error;

/// Per-channel connection settings
pub mod config;

/// Wire-format types
pub mod protocol;

/// Channel connection lifecycle
pub mod connection;

/// Inbound event parsing and routing
pub mod dispatch;

/// Unread-count reconciliation
pub mod unread;

/// Presence/context tracking
pub mod presence;

/// Ephemeral popup control
pub mod popup;

/// REST collaborators
pub mod api;

/// UI-facing session facade
pub mod session;

pub use config::{ChannelConfig, ChannelKind};
pub use connection::{Channel, ConnectionState, StatusUpdate};
pub use error::PulseError;
pub use popup::{PopupContent, PopupIdentity};
pub use presence::{PresenceSnapshot, PresenceTracker, ViewKind};
pub use protocol::{InboundEvent, NotificationPayload, OutboundMessage};
pub use session::{NotificationSession, SessionConfig};
pub use unread::UnreadLedger;
