//! Ephemeral Popups
//!
//! Quick-reply popups and broadcast banners. Independent of the persistent
//! unread counts; the only state is "what is currently shown" plus the set
//! of locally acknowledged identities. Timers are modeled as deadlines so
//! the logic is driven by the caller's clock.

use crate::presence::PresenceSnapshot;
use crate::protocol::{BroadcastPayload, NotificationPayload};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Identity of a popup, used for local acknowledgement persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupIdentity {
    Notification(i64),
    Broadcast(i64),
}

/// What a popup displays.
#[derive(Debug, Clone, PartialEq)]
pub enum PopupContent {
    /// Quick-reply popup for a thread notification.
    QuickReply {
        notification_id: i64,
        thread_id: i64,
        excerpt: Option<String>,
    },
    /// Site-wide broadcast banner.
    Broadcast { broadcast_id: i64, message: String },
}

impl PopupContent {
    pub fn identity(&self) -> PopupIdentity {
        match self {
            Self::QuickReply {
                notification_id, ..
            } => PopupIdentity::Notification(*notification_id),
            Self::Broadcast { broadcast_id, .. } => PopupIdentity::Broadcast(*broadcast_id),
        }
    }
}

#[derive(Debug)]
struct ActivePopup {
    content: PopupContent,
    /// Auto-dismiss deadline; `None` while hovered.
    deadline: Option<Instant>,
}

/// Controls which transient popup, if any, is currently shown.
pub struct PopupController {
    active: Option<ActivePopup>,
    /// Identities already dismissed or acted on; never shown again.
    acknowledged: HashSet<PopupIdentity>,
    auto_dismiss: Duration,
    /// Countdown used when the pointer leaves a hovered popup. Shorter than
    /// the full duration, so grazing a popup cannot pin it open.
    resume_grace: Duration,
}

impl PopupController {
    pub const DEFAULT_AUTO_DISMISS: Duration = Duration::from_secs(8);
    pub const DEFAULT_RESUME_GRACE: Duration = Duration::from_secs(3);

    pub fn new() -> Self {
        Self::with_timing(Self::DEFAULT_AUTO_DISMISS, Self::DEFAULT_RESUME_GRACE)
    }

    pub fn with_timing(auto_dismiss: Duration, resume_grace: Duration) -> Self {
        Self {
            active: None,
            acknowledged: HashSet::new(),
            auto_dismiss,
            resume_grace,
        }
    }

    /// Seed previously persisted acknowledgements (e.g. from local storage).
    pub fn restore_acknowledged(&mut self, identities: impl IntoIterator<Item = PopupIdentity>) {
        self.acknowledged.extend(identities);
    }

    /// The popup currently shown, if any.
    pub fn current(&self) -> Option<&PopupContent> {
        self.active.as_ref().map(|a| &a.content)
    }

    /// Offers a quick-reply popup for an incoming notification. Suppression
    /// rules, evaluated in order: user is in the forum section; user is
    /// viewing the exact thread; identity already acknowledged. Returns
    /// true if the popup was shown.
    pub fn offer_quick_reply(
        &mut self,
        notification: &NotificationPayload,
        presence: &PresenceSnapshot,
        now: Instant,
    ) -> bool {
        let Some(thread_id) = notification.thread_id else {
            return false;
        };
        if presence.is_in_forum() {
            tracing::debug!(thread_id, "quick-reply suppressed: user in forum section");
            return false;
        }
        if presence.is_viewing_thread(thread_id) {
            return false;
        }
        let identity = PopupIdentity::Notification(notification.id);
        if self.acknowledged.contains(&identity) {
            tracing::debug!(?identity, "quick-reply suppressed: already acknowledged");
            return false;
        }
        self.show(
            PopupContent::QuickReply {
                notification_id: notification.id,
                thread_id,
                excerpt: notification.excerpt.clone(),
            },
            now,
        );
        true
    }

    /// Offers a broadcast banner. Only local acknowledgement suppresses it;
    /// broadcasts are site-wide and ignore presence.
    pub fn offer_broadcast(&mut self, broadcast: &BroadcastPayload, now: Instant) -> bool {
        let identity = PopupIdentity::Broadcast(broadcast.id);
        if self.acknowledged.contains(&identity) {
            tracing::debug!(?identity, "broadcast suppressed: already acknowledged");
            return false;
        }
        self.show(
            PopupContent::Broadcast {
                broadcast_id: broadcast.id,
                message: broadcast.message.clone(),
            },
            now,
        );
        true
    }

    fn show(&mut self, content: PopupContent, now: Instant) {
        tracing::debug!(identity = ?content.identity(), "popup shown");
        self.active = Some(ActivePopup {
            content,
            deadline: Some(now + self.auto_dismiss),
        });
    }

    /// Advances the auto-dismiss countdown. Returns the identity of a popup
    /// that just expired, if any.
    pub fn tick(&mut self, now: Instant) -> Option<PopupIdentity> {
        let expired = matches!(
            &self.active,
            Some(ActivePopup {
                deadline: Some(deadline),
                ..
            }) if now >= *deadline
        );
        if expired {
            return self.active.take().map(|p| p.content.identity());
        }
        None
    }

    /// Hover pauses the countdown; leaving restarts it with the shortened
    /// grace period instead of the full duration.
    pub fn set_hovered(&mut self, hovered: bool, now: Instant) {
        if let Some(active) = &mut self.active {
            active.deadline = if hovered {
                None
            } else {
                Some(now + self.resume_grace)
            };
        }
    }

    /// User dismissed the popup. The identity is recorded so it never
    /// reappears.
    pub fn dismiss(&mut self) -> Option<PopupIdentity> {
        let popup = self.active.take()?;
        let identity = popup.content.identity();
        self.acknowledged.insert(identity);
        Some(identity)
    }

    /// User acted on the popup (reply or view); same local bookkeeping as a
    /// dismissal, the caller performs the network call.
    pub fn take_action(&mut self) -> Option<PopupContent> {
        let popup = self.active.take()?;
        self.acknowledged.insert(popup.content.identity());
        Some(popup.content)
    }

    /// Server cleared the active broadcast.
    pub fn clear_broadcast(&mut self) {
        if matches!(
            self.active.as_ref().map(|a| &a.content),
            Some(PopupContent::Broadcast { .. })
        ) {
            self.active = None;
        }
    }

    /// Acknowledged identities, for persistence by the caller.
    pub fn acknowledged(&self) -> Vec<PopupIdentity> {
        self.acknowledged.iter().copied().collect()
    }
}

impl Default for PopupController {
    fn default() -> Self {
        Self::new()
    }
}
