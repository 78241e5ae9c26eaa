//! REST collaborator tests against a mock server

mod common;

use common::{forum_notification, mount_mark_read_error, mount_mark_read_ok};
use forumpulse::api::ApiClient;
use forumpulse::error::PulseError;
use forumpulse::session::{NotificationSession, SessionConfig};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_notifications(server: &MockServer, notifications: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(query_param("limit", "200"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "notifications": notifications })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_mark_read_returns_authoritative_counts() {
    let server = MockServer::start().await;
    mount_mark_read_ok(
        &server,
        5,
        Some(serde_json::json!({
            "thread_id": 5,
            "thread_unread_count": 0,
            "total_forum_unread": 3
        })),
    )
    .await;

    let api = ApiClient::new(server.uri());
    let counts = api.mark_thread_read(5).await.unwrap().unwrap();
    assert_eq!(counts.thread_id, Some(5));
    assert_eq!(counts.thread_unread_count, Some(0));
    assert_eq!(counts.total_forum_unread, Some(3));
}

#[tokio::test]
async fn test_mark_read_without_counts() {
    let server = MockServer::start().await;
    mount_mark_read_ok(&server, 8, None).await;

    let api = ApiClient::new(server.uri());
    assert!(api.mark_thread_read(8).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mark_read_failure_preserves_server_reason() {
    let server = MockServer::start().await;
    mount_mark_read_error(&server, 5, 409, "Thread was deleted").await;

    let api = ApiClient::new(server.uri());
    let err = api.mark_thread_read(5).await.unwrap_err();
    match &err {
        PulseError::Http { status, reason } => {
            assert_eq!(*status, 409);
            assert_eq!(reason, "Thread was deleted");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.user_message(), "Thread was deleted");
}

#[tokio::test]
async fn test_notifications_fetch() {
    let server = MockServer::start().await;
    mount_notifications(
        &server,
        serde_json::json!([
            { "id": 1, "thread_id": 4, "domain": "forum" },
            { "id": 2, "thread_id": 4, "domain": "forum", "excerpt": "see this" }
        ]),
    )
    .await;

    let api = ApiClient::new(server.uri());
    let notifications = api.notifications(200).await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0], {
        let mut expected = forum_notification(1, 4);
        expected.excerpt = None;
        expected
    });
    assert!(notifications.iter().all(|n| n.counts_toward_unread()));
}

#[tokio::test]
async fn test_send_reply_policy_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reply"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({ "error": "Thread is locked" })),
        )
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri());
    let err = api.send_reply(9, "me too").await.unwrap_err();
    assert_eq!(err.user_message(), "Thread is locked");
}

#[tokio::test]
async fn test_error_without_body_falls_back_to_status_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reply"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri());
    let err = api.send_reply(9, "hi").await.unwrap_err();
    match err {
        PulseError::Http { status, reason } => {
            assert_eq!(status, 500);
            assert_eq!(reason, "Internal Server Error");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// Pumps the session until `done` holds or the deadline passes.
async fn pump_until(session: &mut NotificationSession, done: impl Fn(&NotificationSession) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(session) {
        assert!(Instant::now() < deadline, "condition not reached in time");
        session.pump(Instant::now());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_session_mark_read_confirmed() {
    common::init_tracing();
    let server = MockServer::start().await;
    mount_notifications(
        &server,
        serde_json::json!([
            { "id": 1, "thread_id": 5, "domain": "forum" },
            { "id": 2, "thread_id": 5, "domain": "forum" },
            { "id": 3, "thread_id": 6, "domain": "forum" }
        ]),
    )
    .await;
    mount_mark_read_ok(
        &server,
        5,
        Some(serde_json::json!({ "thread_id": 5, "thread_unread_count": 0 })),
    )
    .await;

    let mut session =
        NotificationSession::new(SessionConfig::new(server.uri(), "ws://127.0.0.1:1"));
    session.refresh_snapshot().await.unwrap();
    assert_eq!(session.total_unread(), 3);

    session.mark_thread_read(5);
    // Optimistic clear applies before the server answers.
    assert_eq!(session.thread_unread(5), 0);
    assert_eq!(session.total_unread(), 1);

    // Confirmation settles without changing the counts.
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.pump(Instant::now());
    assert_eq!(session.thread_unread(5), 0);
    assert_eq!(session.total_unread(), 1);
    assert!(session.take_error().is_none());
}

#[tokio::test]
async fn test_session_mark_read_rolled_back() {
    common::init_tracing();
    let server = MockServer::start().await;
    mount_notifications(
        &server,
        serde_json::json!([
            { "id": 1, "thread_id": 5, "domain": "forum" },
            { "id": 2, "thread_id": 5, "domain": "forum" }
        ]),
    )
    .await;
    mount_mark_read_error(&server, 5, 500, "Database unavailable").await;

    let mut session =
        NotificationSession::new(SessionConfig::new(server.uri(), "ws://127.0.0.1:1"));
    session.refresh_snapshot().await.unwrap();

    session.mark_thread_read(5);
    assert_eq!(session.thread_unread(5), 0);

    // Failure restores the exact pre-clear count on a later pump.
    pump_until(&mut session, |s| s.thread_unread(5) == 2).await;
    assert_eq!(session.total_unread(), 2);

    let err = session.take_error().unwrap();
    assert_eq!(err.user_message(), "Database unavailable");
}
