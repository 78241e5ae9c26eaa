//! Shared helpers for integration tests

// Not every test binary uses every helper.
#![allow(dead_code)]

use forumpulse::protocol::NotificationPayload;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Installs the test log subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Unread forum notification attached to a thread.
pub fn forum_notification(id: i64, thread_id: i64) -> NotificationPayload {
    NotificationPayload {
        id,
        thread_id: Some(thread_id),
        domain: Some("forum".to_string()),
        is_read: false,
        excerpt: Some(format!("reply {} in thread {}", id, thread_id)),
        created_at: None,
    }
}

/// Mounts a successful mark-read confirmation, optionally returning
/// authoritative counts in the response body.
pub async fn mount_mark_read_ok(
    server: &MockServer,
    thread_id: i64,
    counts: Option<serde_json::Value>,
) {
    let body = match counts {
        Some(counts) => serde_json::json!({ "success": true, "updated_counts": counts }),
        None => serde_json::json!({ "success": true }),
    };
    Mock::given(method("POST"))
        .and(path(format!("/mark-read/{}", thread_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts a mark-read failure with a server-provided reason.
pub async fn mount_mark_read_error(server: &MockServer, thread_id: i64, status: u16, reason: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/mark-read/{}", thread_id)))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(serde_json::json!({ "error": reason })),
        )
        .mount(server)
        .await;
}
