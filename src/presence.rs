//! Presence/Context Tracking
//!
//! Tracks what the user is currently looking at so the notification core
//! can suppress counts and popups for visible content. Navigation events
//! are the primary signal; a low-frequency polling fallback defends against
//! missed events from third-party navigation code. The core reads presence
//! only through immutable snapshots.

use std::time::{Duration, Instant};

/// Which kind of view the user is in, as far as the forum section is
/// concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Not in the forum section at all.
    Outside,
    /// In the forum section but not inside a thread (index, search, ...).
    SectionIndex,
    /// Inside a discussion thread.
    Discussion,
}

/// Immutable view of the current presence context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub view: ViewKind,
    /// Active thread when `view == Discussion`.
    pub thread_id: Option<i64>,
}

impl PresenceSnapshot {
    /// Context for "not in the forum section".
    pub fn outside() -> Self {
        Self {
            view: ViewKind::Outside,
            thread_id: None,
        }
    }

    /// Context for the forum index or another non-thread forum view.
    pub fn section_index() -> Self {
        Self {
            view: ViewKind::SectionIndex,
            thread_id: None,
        }
    }

    /// Context for an open discussion thread.
    pub fn discussion(thread_id: i64) -> Self {
        Self {
            view: ViewKind::Discussion,
            thread_id: Some(thread_id),
        }
    }

    /// Whether the user is anywhere in the forum section.
    pub fn is_in_forum(&self) -> bool {
        !matches!(self.view, ViewKind::Outside)
    }

    /// Whether the user has this exact thread open.
    pub fn is_viewing_thread(&self, thread_id: i64) -> bool {
        self.view == ViewKind::Discussion && self.thread_id == Some(thread_id)
    }
}

/// Transition produced by a presence update, used to drive mark-read on
/// thread entry and popup suppression on section entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceTransition {
    /// Thread the user just opened.
    pub entered_thread: Option<i64>,
    /// Thread the user just left.
    pub left_thread: Option<i64>,
    /// User entered the forum section.
    pub entered_section: bool,
    /// User left the forum section.
    pub left_section: bool,
}

impl PresenceTransition {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Hybrid event-driven + polling presence tracker.
pub struct PresenceTracker {
    current: PresenceSnapshot,
    last_poll: Option<Instant>,
    poll_interval: Duration,
}

impl PresenceTracker {
    /// Default fallback poll cadence.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::with_poll_interval(Self::DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            current: PresenceSnapshot::outside(),
            last_poll: None,
            poll_interval,
        }
    }

    /// Pure read of the current context.
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.current
    }

    /// Applies a navigation update and reports what changed. The same
    /// entry point serves both the event-driven path and the polling
    /// fallback, so a missed event is repaired on the next poll.
    pub fn update(&mut self, next: PresenceSnapshot) -> PresenceTransition {
        let prev = self.current;
        if prev == next {
            return PresenceTransition::default();
        }
        self.current = next;

        let prev_thread = match prev.view {
            ViewKind::Discussion => prev.thread_id,
            _ => None,
        };
        let next_thread = match next.view {
            ViewKind::Discussion => next.thread_id,
            _ => None,
        };

        let transition = PresenceTransition {
            entered_thread: (next_thread != prev_thread).then_some(next_thread).flatten(),
            left_thread: (next_thread != prev_thread).then_some(prev_thread).flatten(),
            entered_section: !prev.is_in_forum() && next.is_in_forum(),
            left_section: prev.is_in_forum() && !next.is_in_forum(),
        };
        tracing::debug!(?transition, "presence changed");
        transition
    }

    /// Whether the fallback poll is due. Callers read their navigation
    /// signals and feed the result back through [`update`](Self::update).
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.last_poll {
            Some(last) if now.duration_since(last) < self.poll_interval => false,
            _ => {
                self.last_poll = Some(now);
                true
            }
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads() {
        let viewing = PresenceSnapshot::discussion(5);
        assert!(viewing.is_in_forum());
        assert!(viewing.is_viewing_thread(5));
        assert!(!viewing.is_viewing_thread(6));

        let index = PresenceSnapshot::section_index();
        assert!(index.is_in_forum());
        assert!(!index.is_viewing_thread(5));

        assert!(!PresenceSnapshot::outside().is_in_forum());
    }

    #[test]
    fn test_entering_thread() {
        let mut tracker = PresenceTracker::new();
        let t = tracker.update(PresenceSnapshot::discussion(3));
        assert_eq!(t.entered_thread, Some(3));
        assert_eq!(t.left_thread, None);
        assert!(t.entered_section);
        assert!(!t.left_section);
    }

    #[test]
    fn test_switching_threads() {
        let mut tracker = PresenceTracker::new();
        tracker.update(PresenceSnapshot::discussion(3));
        let t = tracker.update(PresenceSnapshot::discussion(4));
        assert_eq!(t.entered_thread, Some(4));
        assert_eq!(t.left_thread, Some(3));
        assert!(!t.entered_section);
        assert!(!t.left_section);
    }

    #[test]
    fn test_leaving_section() {
        let mut tracker = PresenceTracker::new();
        tracker.update(PresenceSnapshot::discussion(3));
        let t = tracker.update(PresenceSnapshot::outside());
        assert_eq!(t.left_thread, Some(3));
        assert_eq!(t.entered_thread, None);
        assert!(t.left_section);
    }

    #[test]
    fn test_unchanged_update_is_noop() {
        let mut tracker = PresenceTracker::new();
        tracker.update(PresenceSnapshot::discussion(3));
        let t = tracker.update(PresenceSnapshot::discussion(3));
        assert!(t.is_noop());
    }

    #[test]
    fn test_thread_to_index_leaves_thread_only() {
        let mut tracker = PresenceTracker::new();
        tracker.update(PresenceSnapshot::discussion(3));
        let t = tracker.update(PresenceSnapshot::section_index());
        assert_eq!(t.left_thread, Some(3));
        assert!(!t.left_section);
        assert!(!t.entered_section);
    }

    #[test]
    fn test_poll_gating() {
        let mut tracker = PresenceTracker::with_poll_interval(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(tracker.poll_due(t0));
        assert!(!tracker.poll_due(t0 + Duration::from_secs(2)));
        assert!(tracker.poll_due(t0 + Duration::from_secs(6)));
    }
}
