//! HTTP Collaborators
//!
//! REST calls that back the realtime layer: confirming optimistic
//! mark-read mutations, fetching the notification snapshot when a channel
//! cannot deliver `initial_data`, and posting quick replies. Server-provided
//! error reasons are preserved so the UI can surface them verbatim.

use crate::error::PulseError;
use crate::protocol::{CountCorrection, NotificationPayload};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Response body for a mark-read confirmation. The server may attach
/// authoritative counts; when present they win over the optimistic guess.
#[derive(Debug, Deserialize)]
struct MarkReadResponse {
    #[serde(default)]
    updated_counts: Option<CountCorrection>,
}

#[derive(Debug, Deserialize)]
struct NotificationsResponse {
    #[serde(default)]
    notifications: Vec<NotificationPayload>,
}

/// Error body shape used by the platform's REST endpoints.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the platform's notification REST endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
}

impl ApiClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.session_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Confirms an optimistic thread clear. On success the server may
    /// return authoritative counts for the caller to apply.
    pub async fn mark_thread_read(
        &self,
        thread_id: i64,
    ) -> Result<Option<CountCorrection>, PulseError> {
        debug!(thread_id, "confirming mark-read");
        let response = self
            .request(reqwest::Method::POST, &format!("/mark-read/{}", thread_id))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: MarkReadResponse = response.json().await?;
        Ok(body.updated_counts)
    }

    /// Fetches the current unread notification snapshot. Fallback for
    /// channels that do not replay `initial_data`.
    pub async fn notifications(
        &self,
        limit: u32,
    ) -> Result<Vec<NotificationPayload>, PulseError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/notifications?limit={}", limit),
            )
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: NotificationsResponse = response.json().await?;
        debug!(count = body.notifications.len(), "notification snapshot fetched");
        Ok(body.notifications)
    }

    /// Posts a quick reply to the notification being answered. Policy
    /// failures (locked thread, rate limit) come back with the server's
    /// reason intact.
    pub async fn send_reply(&self, reply_to_id: i64, content: &str) -> Result<(), PulseError> {
        let response = self
            .request(reqwest::Method::POST, "/reply")
            .json(&serde_json::json!({ "content": content, "reply_to_id": reply_to_id }))
            .send()
            .await?;
        Self::check(response).await?;
        debug!(reply_to_id, "quick reply posted");
        Ok(())
    }

    /// Maps a non-success status to [`PulseError::Http`], preferring the
    /// server's own reason text over a generic one.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PulseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = match response.json::<ErrorBody>().await {
            Ok(body) => body.error.or(body.message),
            Err(_) => None,
        };
        let reason = reason.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        warn!(status = status.as_u16(), %reason, "collaborator request failed");
        Err(PulseError::http(status.as_u16(), reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let api = ApiClient::new("https://example.com/");
        assert_eq!(api.base_url, "https://example.com");
    }

    #[test]
    fn test_mark_read_response_without_counts() {
        let body: MarkReadResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(body.updated_counts.is_none());
    }

    #[test]
    fn test_mark_read_response_with_counts() {
        let body: MarkReadResponse = serde_json::from_str(
            r#"{"updated_counts":{"thread_id":5,"thread_unread_count":0,"total_forum_unread":2}}"#,
        )
        .unwrap();
        let counts = body.updated_counts.unwrap();
        assert_eq!(counts.thread_id, Some(5));
        assert_eq!(counts.total_forum_unread, Some(2));
    }

    #[test]
    fn test_error_body_prefers_error_field() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"Thread is locked","message":"other"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("Thread is locked"));
    }
}
