//! Error Types
//!
//! This module defines the error taxonomy for the notification core.
//! Every failure in the subsystem maps to one of these variants and is
//! handled locally; nothing propagates to a panic or an unhandled surface.
//!
//! # Error Categories
//!
//! - `Serialization` - JSON encode/decode failures for wire frames
//! - `Transport` - socket-level failures (connect, read, write)
//! - `Timeout` - connect or heartbeat deadlines that expired
//! - `Http` - collaborator endpoint returned a non-success status
//! - `Confirmation` - an optimistic mutation failed server confirmation
//! - `NotConnected` - a send was attempted on a channel with no live socket
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across thread
//! boundaries.
use thiserror::Error;

/// Errors produced by the notification core.
#[derive(Debug, Error, Clone)]
pub enum PulseError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// Socket-level transport failure
    #[error("Transport error: {reason}")]
    Transport {
        /// Human-readable failure reason
        reason: String,
    },

    /// A deadline expired before the expected event arrived
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The deadline that expired, in milliseconds
        timeout_ms: u64,
    },

    /// Collaborator endpoint returned a non-success status
    #[error("HTTP {status}: {reason}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Server-provided reason when available, generic fallback otherwise
        reason: String,
    },

    /// Server confirmation of an optimistic mutation failed
    #[error("Confirmation failed: {reason}")]
    Confirmation {
        /// Human-readable failure reason
        reason: String,
    },

    /// A send was attempted while the channel had no live socket
    #[error("Channel is not connected")]
    NotConnected,
}

impl PulseError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a new HTTP error
    pub fn http(status: u16, reason: impl Into<String>) -> Self {
        Self::Http {
            status,
            reason: reason.into(),
        }
    }

    /// Create a new confirmation error
    pub fn confirmation(reason: impl Into<String>) -> Self {
        Self::Confirmation {
            reason: reason.into(),
        }
    }

    /// One-line text suitable for a toast; server reasons pass through,
    /// everything else collapses to a generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { reason, .. } => reason.clone(),
            Self::Confirmation { reason } => reason.clone(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for PulseError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(format!("HTTP transport error: {}", err))
    }
}
