use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ViewPhase;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Invalid input, unknown channel/cursor, or other configuration issue.
    Config,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the server.
    RateLimited,
    /// Live-feed subscription failure.
    Subscription,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal engine bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct SyncError {
    /// High-level error category.
    pub category: SyncErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl SyncError {
    /// Construct a new sync error.
    pub fn new(
        category: SyncErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Build a standard invalid-phase-transition error.
    pub fn invalid_phase(current: ViewPhase, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            SyncErrorCategory::Internal,
            "invalid_phase_transition",
            format!("cannot run '{action}' while the view is in phase {current:?}"),
        )
    }
}

/// Map HTTP status codes from the page-fetch transport to error categories.
pub fn classify_http_status(status: u16) -> SyncErrorCategory {
    match status {
        408 | 429 => SyncErrorCategory::RateLimited,
        400..=499 => SyncErrorCategory::Config,
        500..=599 => SyncErrorCategory::Network,
        _ => SyncErrorCategory::Internal,
    }
}
