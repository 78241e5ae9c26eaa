//! Unread-Count Reconciliation
//!
//! Maintains the per-thread unread map and the aggregate total under two
//! competing writers: optimistic local mutations (mark-read before the
//! server confirms) and authoritative server corrections. The aggregate is
//! a derived quantity; every per-thread mutation re-derives it as the sum
//! of the map. A server-pushed bare total may override it momentarily, and
//! the next per-thread mutation reconciles it back.
//!
//! Ownership rule: only this module mutates the map. Everything else reads
//! through clone-on-read accessors.

use crate::presence::PresenceSnapshot;
use crate::protocol::{CountCorrection, NotificationPayload};
use std::collections::HashMap;

/// Snapshot captured before an optimistic thread clear, used to roll the
/// mutation back if server confirmation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClear {
    /// Thread whose entry was deleted.
    pub thread_id: i64,
    /// Count the entry held before deletion.
    pub previous: u32,
}

/// Per-thread unread counts plus the derived aggregate.
#[derive(Debug, Default)]
pub struct UnreadLedger {
    /// Thread id → unread count. No entry means zero; values are never 0.
    thread_counts: HashMap<i64, u32>,
    /// Derived aggregate; equal to the sum of `thread_counts` except while a
    /// bare server total is temporarily trusted.
    total: u32,
    /// Set whenever observable state changed; the UI drains it per frame.
    dirty: bool,
}

impl UnreadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total unread across all threads.
    pub fn total_unread(&self) -> u32 {
        self.total
    }

    /// Unread count for one thread. Absent entry reads as zero.
    pub fn thread_unread(&self, thread_id: i64) -> u32 {
        self.thread_counts.get(&thread_id).copied().unwrap_or(0)
    }

    /// Clone-on-read view of the whole map.
    pub fn thread_counts(&self) -> HashMap<i64, u32> {
        self.thread_counts.clone()
    }

    /// Whether the aggregate currently equals the derived sum. False only
    /// while a bare server total is being trusted.
    pub fn is_consistent(&self) -> bool {
        self.total == self.derived_total()
    }

    /// Takes and clears the render flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn derived_total(&self) -> u32 {
        self.thread_counts.values().sum()
    }

    fn rederive(&mut self) {
        self.total = self.derived_total();
        self.dirty = true;
    }

    /// Counts one incoming notification against its thread, unless the user
    /// is currently looking at that exact thread. The visible thread is
    /// never counted; incrementing it would leave a ghost count if the
    /// mark-read call is still in flight.
    ///
    /// Returns true if the count changed.
    pub fn record_incoming(&mut self, thread_id: i64, presence: &PresenceSnapshot) -> bool {
        if presence.is_viewing_thread(thread_id) {
            tracing::debug!(thread_id, "notification for visible thread, not counted");
            return false;
        }
        *self.thread_counts.entry(thread_id).or_insert(0) += 1;
        self.rederive();
        true
    }

    /// One notification in the thread was read elsewhere (another tab or
    /// view); decrement by one, removing the entry at zero.
    pub fn record_read(&mut self, thread_id: i64) {
        if let Some(count) = self.thread_counts.get_mut(&thread_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.thread_counts.remove(&thread_id);
            }
            self.rederive();
        }
    }

    /// Optimistically clears a thread: captures the current count for
    /// rollback, deletes the entry, and re-derives the aggregate. Returns
    /// `None` when the thread had no unread entry (nothing to confirm).
    pub fn begin_clear(&mut self, thread_id: i64) -> Option<PendingClear> {
        let previous = self.thread_counts.remove(&thread_id)?;
        self.rederive();
        tracing::debug!(thread_id, previous, "optimistic clear applied");
        Some(PendingClear {
            thread_id,
            previous,
        })
    }

    /// Server confirmed the clear. Any authoritative counts in the response
    /// win over the local guess.
    pub fn confirm_clear(&mut self, _pending: PendingClear, counts: Option<CountCorrection>) {
        if let Some(correction) = counts {
            self.apply_authoritative(correction);
        }
    }

    /// Confirmation failed: restore the captured count exactly and
    /// re-derive. The next user action will re-attempt; there is no
    /// automatic retry.
    pub fn rollback_clear(&mut self, pending: PendingClear) {
        tracing::warn!(
            thread_id = pending.thread_id,
            restored = pending.previous,
            "mark-read confirmation failed, rolling back"
        );
        if pending.previous > 0 {
            self.thread_counts.insert(pending.thread_id, pending.previous);
        }
        self.rederive();
    }

    /// Applies a server-pushed correction. A per-thread count of zero
    /// deletes the entry; nonzero sets it directly. A bare total is trusted
    /// as-is until the next per-thread mutation re-derives the sum.
    pub fn apply_authoritative(&mut self, correction: CountCorrection) {
        if let (Some(thread_id), Some(count)) =
            (correction.thread_id, correction.thread_unread_count)
        {
            if count == 0 {
                self.thread_counts.remove(&thread_id);
            } else {
                self.thread_counts.insert(thread_id, count);
            }
            self.rederive();
            return;
        }
        if let Some(total) = correction.total_forum_unread {
            // The aggregate is a cache, not a second source of truth; drift
            // lasts only until the next per-thread mutation.
            self.total = total;
            self.dirty = true;
        }
    }

    /// Rebuilds the map from a server snapshot: unread forum notifications
    /// only, excluding the thread currently in view, grouped by thread.
    pub fn load_snapshot(
        &mut self,
        notifications: &[NotificationPayload],
        presence: &PresenceSnapshot,
    ) {
        let mut counts: HashMap<i64, u32> = HashMap::new();
        for n in notifications {
            if !n.counts_toward_unread() {
                continue;
            }
            let Some(thread_id) = n.thread_id else {
                continue;
            };
            if presence.is_viewing_thread(thread_id) {
                continue;
            }
            *counts.entry(thread_id).or_insert(0) += 1;
        }
        tracing::debug!(threads = counts.len(), "snapshot loaded");
        self.thread_counts = counts;
        self.rederive();
    }
}
