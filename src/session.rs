//! Notification Session
//!
//! The facade the UI talks to. Owns the per-channel connections, the unread
//! ledger, the popup controller, and the presence tracker, and wires them
//! together: inbound events are drained and dispatched on every pump,
//! optimistic mark-read mutations are confirmed (or rolled back) against
//! the REST API, and status transitions are kept in a bounded log.
//!
//! The pump is synchronous and non-blocking; call it once per UI frame.

use crate::api::ApiClient;
use crate::config::{ChannelConfig, ChannelKind};
use crate::connection::{Channel, ConnectionState, StatusUpdate};
use crate::dispatch::{self, DispatchTargets};
use crate::error::PulseError;
use crate::popup::{PopupContent, PopupController, PopupIdentity};
use crate::presence::{PresenceSnapshot, PresenceTracker};
use crate::protocol::{CountCorrection, OutboundMessage};
use crate::unread::{PendingClear, UnreadLedger};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Identity and endpoints for one user session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST base, e.g. `https://example.com`.
    pub http_base: String,
    /// WebSocket base, e.g. `wss://example.com`.
    pub ws_base: String,
    pub session_token: Option<String>,
    pub user_id: Option<i64>,
}

impl SessionConfig {
    pub fn new(http_base: impl Into<String>, ws_base: impl Into<String>) -> Self {
        Self {
            http_base: http_base.into(),
            ws_base: ws_base.into(),
            session_token: None,
            user_id: None,
        }
    }

    pub fn with_identity(mut self, token: impl Into<String>, user_id: i64) -> Self {
        self.session_token = Some(token.into());
        self.user_id = Some(user_id);
        self
    }

    fn channel_config(&self, kind: ChannelKind) -> ChannelConfig {
        let mut config = ChannelConfig::for_kind(&self.ws_base, kind);
        if let Some(token) = &self.session_token {
            config = config.with_session_token(token.clone());
        }
        if let Some(user_id) = self.user_id {
            config = config.with_user_id(user_id);
        }
        config
    }
}

/// One line of the connection status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub channel: ChannelKind,
    pub update: StatusUpdate,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Result of one mark-read confirmation round trip, reported back to the
/// pump by the spawned API task.
struct ClearResult {
    pending: PendingClear,
    outcome: Result<Option<CountCorrection>, PulseError>,
}

const STATUS_LOG_CAPACITY: usize = 100;
const SNAPSHOT_FETCH_LIMIT: u32 = 200;

/// UI-facing facade over the whole realtime notification layer.
pub struct NotificationSession {
    config: SessionConfig,
    api: ApiClient,
    channels: HashMap<ChannelKind, Channel>,
    ledger: UnreadLedger,
    popups: PopupController,
    presence: PresenceTracker,
    session_id: Option<String>,
    status_log: VecDeque<StatusEntry>,
    last_error: Option<PulseError>,
    clear_tx: mpsc::UnboundedSender<ClearResult>,
    clear_rx: mpsc::UnboundedReceiver<ClearResult>,
}

impl NotificationSession {
    pub fn new(config: SessionConfig) -> Self {
        let mut api = ApiClient::new(&config.http_base);
        if let Some(token) = &config.session_token {
            api = api.with_session_token(token.clone());
        }
        let (clear_tx, clear_rx) = mpsc::unbounded_channel();
        Self {
            config,
            api,
            channels: HashMap::new(),
            ledger: UnreadLedger::new(),
            popups: PopupController::new(),
            presence: PresenceTracker::new(),
            session_id: None,
            status_log: VecDeque::new(),
            last_error: None,
            clear_tx,
            clear_rx,
        }
    }

    /// Opens the channels every page needs: the global counter channel plus
    /// the broadcast and quick-reply channels.
    pub fn start(&mut self) {
        self.open_channel(ChannelKind::Global);
        self.open_channel(ChannelKind::Broadcast);
        self.open_channel(ChannelKind::QuickReply);
    }

    /// Opens (or reuses) the channel of the given kind.
    pub fn open_channel(&mut self, kind: ChannelKind) {
        let channel = self
            .channels
            .entry(kind)
            .or_insert_with(|| Channel::new(self.config.channel_config(kind)));
        channel.connect();
    }

    /// Closes page-scoped channels on navigation. The global channel stays
    /// alive so the unread counter keeps updating across pages.
    pub fn leave_page(&mut self) {
        let page_scoped: Vec<ChannelKind> = self
            .channels
            .keys()
            .filter(|k| matches!(k, ChannelKind::Thread(_)))
            .copied()
            .collect();
        for kind in page_scoped {
            if let Some(mut channel) = self.channels.remove(&kind) {
                channel.disconnect();
            }
        }
        info!("page-scoped channels closed, global channel kept alive");
    }

    /// Tears down every channel, including the global one. Used at logout.
    pub fn shutdown(&mut self) {
        for (_, mut channel) in self.channels.drain() {
            channel.disconnect();
        }
    }

    /// The only exit from a channel's failed state.
    pub fn force_reconnect(&mut self, kind: ChannelKind) {
        if let Some(channel) = self.channels.get_mut(&kind) {
            channel.force_reconnect();
        }
    }

    /// Drives one frame: drains channel status and events, settles finished
    /// mark-read confirmations, and advances the popup countdown. Returns
    /// true when observable state changed and the UI should re-render.
    pub fn pump(&mut self, now: Instant) -> bool {
        let mut changed = false;
        let presence = self.presence.snapshot();

        let mut status: Vec<StatusEntry> = Vec::new();
        let mut events = Vec::new();
        for (kind, channel) in self.channels.iter_mut() {
            for update in channel.poll_status() {
                status.push(StatusEntry {
                    channel: *kind,
                    update,
                    at: chrono::Utc::now(),
                });
            }
            events.extend(channel.poll_events());
        }

        for entry in status {
            changed = true;
            self.push_status(entry);
        }

        for event in events {
            let outcome = dispatch::route(
                event,
                DispatchTargets {
                    ledger: &mut self.ledger,
                    popups: &mut self.popups,
                    presence: &presence,
                },
                now,
            );
            if let Some(session_id) = outcome.session_established {
                debug!(%session_id, "session established");
                self.session_id = Some(session_id);
            }
            changed = true;
        }

        while let Ok(result) = self.clear_rx.try_recv() {
            changed = true;
            match result.outcome {
                Ok(counts) => {
                    self.ledger.confirm_clear(result.pending, counts);
                }
                Err(e) => {
                    self.ledger.rollback_clear(result.pending);
                    self.last_error = Some(e);
                }
            }
        }

        if self.popups.tick(now).is_some() {
            changed = true;
        }

        // Drain the flag even when something else already changed, or it
        // would force a spurious re-render on the next pump.
        let dirty = self.ledger.take_dirty();
        changed || dirty
    }

    /// Applies a navigation update. Entering a thread optimistically clears
    /// its unread count and kicks off server confirmation.
    pub fn set_presence(&mut self, next: PresenceSnapshot) {
        let transition = self.presence.update(next);
        if let Some(thread_id) = transition.entered_thread {
            self.mark_thread_read(thread_id);
        }
    }

    /// Fallback presence poll. Returns true when the caller should read its
    /// navigation signals and call [`set_presence`](Self::set_presence).
    pub fn presence_poll_due(&mut self, now: Instant) -> bool {
        self.presence.poll_due(now)
    }

    /// Optimistically clears a thread's unread count, then confirms against
    /// the server. On failure the count is restored on a later pump and the
    /// error is surfaced through [`take_error`](Self::take_error).
    pub fn mark_thread_read(&mut self, thread_id: i64) {
        let Some(pending) = self.ledger.begin_clear(thread_id) else {
            return;
        };
        let api = self.api.clone();
        let tx = self.clear_tx.clone();
        tokio::spawn(async move {
            let outcome = api.mark_thread_read(thread_id).await;
            let _ = tx.send(ClearResult { pending, outcome });
        });
    }

    /// Fetches the unread snapshot over REST and rebuilds the ledger. Used
    /// when the global channel could not deliver `initial_data`.
    pub async fn refresh_snapshot(&mut self) -> Result<(), PulseError> {
        let notifications = self.api.notifications(SNAPSHOT_FETCH_LIMIT).await?;
        self.ledger
            .load_snapshot(&notifications, &self.presence.snapshot());
        Ok(())
    }

    /// Posts a quick reply from the popup. The popup is consumed first;
    /// server-side policy failures come back with their reason intact.
    pub async fn send_quick_reply(&mut self, content: &str) -> Result<(), PulseError> {
        let Some(PopupContent::QuickReply {
            notification_id, ..
        }) = self.popups.take_action()
        else {
            return Err(PulseError::confirmation("no quick-reply popup active"));
        };
        self.api.send_reply(notification_id, content).await
    }

    /// Typing indicator on the quick-reply channel. Dropped silently when
    /// the channel is down; a typing signal is not worth queuing.
    pub fn send_typing(&mut self, is_typing: bool) {
        if let Some(channel) = self.channels.get(&ChannelKind::QuickReply) {
            if let Err(e) = channel.send(OutboundMessage::Typing { is_typing }) {
                debug!(error = %e, "typing indicator dropped");
            }
        }
    }

    /// Dismisses the active popup and records the acknowledgement.
    pub fn dismiss_popup(&mut self) -> Option<PopupIdentity> {
        let identity = self.popups.dismiss();
        if let Some(PopupIdentity::Broadcast(broadcast_id)) = identity {
            self.acknowledge_broadcast(broadcast_id);
        }
        identity
    }

    /// Pointer entered or left the active popup.
    pub fn set_popup_hovered(&mut self, hovered: bool, now: Instant) {
        self.popups.set_hovered(hovered, now);
    }

    fn acknowledge_broadcast(&mut self, broadcast_id: i64) {
        if let Some(channel) = self.channels.get(&ChannelKind::Broadcast) {
            if let Err(e) = channel.send(OutboundMessage::AcknowledgeBroadcast { broadcast_id }) {
                warn!(broadcast_id, error = %e, "broadcast acknowledgement not sent");
            }
        }
    }

    fn push_status(&mut self, entry: StatusEntry) {
        debug!(channel = %entry.channel, update = %entry.update, "channel status");
        if self.status_log.len() == STATUS_LOG_CAPACITY {
            self.status_log.pop_front();
        }
        self.status_log.push_back(entry);
    }

    // Read surface for the UI.

    pub fn total_unread(&self) -> u32 {
        self.ledger.total_unread()
    }

    pub fn thread_unread(&self, thread_id: i64) -> u32 {
        self.ledger.thread_unread(thread_id)
    }

    pub fn thread_counts(&self) -> HashMap<i64, u32> {
        self.ledger.thread_counts()
    }

    pub fn current_popup(&self) -> Option<&PopupContent> {
        self.popups.current()
    }

    pub fn presence(&self) -> PresenceSnapshot {
        self.presence.snapshot()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn channel_state(&self, kind: ChannelKind) -> ConnectionState {
        self.channels
            .get(&kind)
            .map(|c| c.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Recent connection status transitions, oldest first.
    pub fn status_log(&self) -> impl Iterator<Item = &StatusEntry> {
        self.status_log.iter()
    }

    /// Takes the most recent surfaced error, if any. The UI shows
    /// [`PulseError::user_message`] as a toast.
    pub fn take_error(&mut self) -> Option<PulseError> {
        self.last_error.take()
    }
}
