//! Inbound Event Dispatch
//!
//! Turns raw text frames into typed events and routes each event to the
//! state mutation it implies. Malformed JSON and unknown event types are
//! logged and dropped; a bad message never tears the channel down. Events
//! from one channel are applied strictly in arrival order.

use crate::popup::PopupController;
use crate::presence::PresenceSnapshot;
use crate::protocol::{CountCorrection, InboundEvent};
use crate::unread::UnreadLedger;
use std::time::Instant;

/// Why a frame was rejected. Both cases drop the single message and leave
/// the channel alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRejection {
    /// Not valid JSON, or not an object with a `type` field.
    Malformed(String),
    /// Valid JSON with a `type` this client does not understand.
    UnknownType(String),
}

/// Parses one text frame into a typed event.
pub fn parse_frame(raw: &str) -> Result<InboundEvent, FrameRejection> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| FrameRejection::Malformed(format!("invalid JSON: {}", e)))?;

    let Some(tag) = value.get("type").and_then(|t| t.as_str()) else {
        return Err(FrameRejection::Malformed(
            "missing or non-string 'type' field".to_string(),
        ));
    };
    // Owned copy: the error path below needs the tag after `value` is
    // consumed.
    let tag = tag.to_string();

    if !InboundEvent::KNOWN_TYPES.contains(&tag.as_str()) {
        return Err(FrameRejection::UnknownType(tag));
    }

    serde_json::from_value(value)
        .map_err(|e| FrameRejection::Malformed(format!("bad payload for '{}': {}", tag, e)))
}

/// Routing targets: the mutable state one event application may touch.
/// Presence is read-only to the dispatcher.
pub struct DispatchTargets<'a> {
    pub ledger: &'a mut UnreadLedger,
    pub popups: &'a mut PopupController,
    pub presence: &'a PresenceSnapshot,
}

/// What the caller should do after an event was applied. Everything that
/// needs I/O (acknowledgements, session bookkeeping) is reported back
/// instead of performed here, so event application never suspends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Session id announced by the server on connect.
    pub session_established: Option<String>,
}

/// Applies one event to local state. Never fails: events that do not apply
/// cleanly are logged and skipped.
pub fn route(event: InboundEvent, targets: DispatchTargets<'_>, now: Instant) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    match event {
        InboundEvent::Connected {
            message,
            session_id,
        } => {
            tracing::info!(?message, ?session_id, "channel acknowledged by server");
            outcome.session_established = session_id;
        }
        InboundEvent::NewNotification { notification } => {
            if notification.counts_toward_unread() {
                if let Some(thread_id) = notification.thread_id {
                    targets.ledger.record_incoming(thread_id, targets.presence);
                }
            }
            targets
                .popups
                .offer_quick_reply(&notification, targets.presence, now);
        }
        InboundEvent::NotificationRead { thread_id } => {
            targets.ledger.record_read(thread_id);
        }
        InboundEvent::UnreadCountUpdated(correction) => {
            targets.ledger.apply_authoritative(correction);
        }
        InboundEvent::InitialData { notifications } => {
            targets
                .ledger
                .load_snapshot(&notifications, targets.presence);
        }
        InboundEvent::ThreadMarkedRead { thread_id, user_id } => {
            tracing::debug!(thread_id, user_id, "thread marked read elsewhere");
            targets.ledger.apply_authoritative(CountCorrection {
                thread_id: Some(thread_id),
                thread_unread_count: Some(0),
                total_forum_unread: None,
            });
        }
        InboundEvent::NewBroadcast { broadcast } => {
            targets.popups.offer_broadcast(&broadcast, now);
        }
        InboundEvent::BroadcastCleared => {
            targets.popups.clear_broadcast();
        }
        // Liveness frames are consumed by the connection layer; seeing one
        // here is harmless.
        InboundEvent::Heartbeat | InboundEvent::Pong => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceSnapshot;
    use assert_matches::assert_matches;

    fn targets<'a>(
        ledger: &'a mut UnreadLedger,
        popups: &'a mut PopupController,
        presence: &'a PresenceSnapshot,
    ) -> DispatchTargets<'a> {
        DispatchTargets {
            ledger,
            popups,
            presence,
        }
    }

    #[test]
    fn test_parse_malformed_json() {
        assert_matches!(parse_frame("{not json"), Err(FrameRejection::Malformed(_)));
        assert_matches!(parse_frame("[1,2,3]"), Err(FrameRejection::Malformed(_)));
        assert_matches!(
            parse_frame(r#"{"payload":1}"#),
            Err(FrameRejection::Malformed(_))
        );
    }

    #[test]
    fn test_parse_unknown_type() {
        let rejection = parse_frame(r#"{"type":"server_gossip","data":1}"#).unwrap_err();
        assert_eq!(
            rejection,
            FrameRejection::UnknownType("server_gossip".to_string())
        );
    }

    #[test]
    fn test_parse_known_type_bad_payload() {
        // Right tag, wrong field type; the rejection names the tag.
        match parse_frame(r#"{"type":"notification_read","thread_id":"five"}"#) {
            Err(FrameRejection::Malformed(reason)) => {
                assert!(reason.contains("notification_read"), "reason: {}", reason);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ok() {
        let event = parse_frame(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(event, InboundEvent::Pong);
    }

    #[test]
    fn test_route_new_notification_counts_and_pops() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::outside();
        let event = parse_frame(
            r#"{"type":"new_notification","notification":{"id":1,"thread_id":5,"domain":"forum"}}"#,
        )
        .unwrap();

        route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert_eq!(ledger.thread_unread(5), 1);
        assert!(popups.current().is_some());
    }

    #[test]
    fn test_route_suppresses_for_visible_thread() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::discussion(5);
        let event = parse_frame(
            r#"{"type":"new_notification","notification":{"id":1,"thread_id":5,"domain":"forum"}}"#,
        )
        .unwrap();

        route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert_eq!(ledger.thread_unread(5), 0);
        assert_eq!(ledger.total_unread(), 0);
        assert!(popups.current().is_none());
    }

    #[test]
    fn test_route_initial_data_collapse() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::outside();
        let event = parse_frame(
            r#"{"type":"initial_data","notifications":[
                {"id":1,"thread_id":1,"domain":"forum"},
                {"id":2,"thread_id":1,"domain":"forum"}
            ]}"#,
        )
        .unwrap();

        route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert_eq!(ledger.thread_unread(1), 2);
        assert_eq!(ledger.total_unread(), 2);
    }

    #[test]
    fn test_route_thread_marked_read_clears_entry() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::outside();
        ledger.record_incoming(5, &presence);
        ledger.record_incoming(5, &presence);

        let event =
            parse_frame(r#"{"type":"thread_marked_read","thread_id":5,"user_id":2}"#).unwrap();
        route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert_eq!(ledger.thread_unread(5), 0);
        assert!(!ledger.thread_counts().contains_key(&5));
    }

    #[test]
    fn test_route_broadcast_lifecycle() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::outside();

        let event = parse_frame(
            r#"{"type":"new_broadcast","broadcast":{"id":9,"message":"downtime"}}"#,
        )
        .unwrap();
        route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert!(popups.current().is_some());

        let event = parse_frame(r#"{"type":"broadcast_cleared"}"#).unwrap();
        route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert!(popups.current().is_none());
    }

    #[test]
    fn test_route_connected_reports_session() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::outside();
        let event =
            parse_frame(r#"{"type":"connected","message":"ok","session_id":"s42"}"#).unwrap();
        let outcome = route(
            event,
            targets(&mut ledger, &mut popups, &presence),
            Instant::now(),
        );
        assert_eq!(outcome.session_established, Some("s42".to_string()));
    }

    #[test]
    fn test_route_liveness_frames_are_noops() {
        let mut ledger = UnreadLedger::new();
        let mut popups = PopupController::new();
        let presence = PresenceSnapshot::outside();
        for raw in [r#"{"type":"heartbeat"}"#, r#"{"type":"pong"}"#] {
            let event = parse_frame(raw).unwrap();
            route(
                event,
                targets(&mut ledger, &mut popups, &presence),
                Instant::now(),
            );
        }
        assert_eq!(ledger.total_unread(), 0);
        assert!(popups.current().is_none());
    }
}
