//! # Token Records
//!
//! The persisted token record and the views derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored token record.
///
/// Serialized as `{sessionId, createdAt, expiresAt, completed}` with epoch-ms
/// timestamps. The token itself is the storage key and is not part of the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// Bound checkout session id
    #[serde(alias = "stripeSessionId")]
    pub session_id: String,

    /// Creation time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Absolute deadline
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,

    /// Terminal success flag
    #[serde(alias = "isCompleted")]
    pub completed: bool,
}

impl TokenRecord {
    /// Create a fresh record valid for `window` starting at `now`
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: now,
            expires_at: now + window,
            completed: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && !self.completed
    }

    /// Milliseconds left before the deadline, never negative
    pub fn remaining_ms_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_milliseconds().max(0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Result of a successful create
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Validation view of a token returned by query.
///
/// An absent record produces the "gone" shape: not used, expired, not valid,
/// and no record details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub is_used: bool,
    pub is_expired: bool,
    pub is_valid: bool,
    pub session_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub time_remaining_ms: i64,
}

impl TokenStatus {
    /// Status for a token that is not in storage
    pub fn absent() -> Self {
        Self {
            is_used: false,
            is_expired: true,
            is_valid: false,
            session_id: None,
            created_at: None,
            expires_at: None,
            time_remaining_ms: 0,
        }
    }

    pub fn from_record(record: &TokenRecord, now: DateTime<Utc>) -> Self {
        Self {
            is_used: record.completed,
            is_expired: record.is_expired_at(now),
            is_valid: record.is_valid_at(now),
            session_id: Some(record.session_id.clone()),
            created_at: Some(record.created_at),
            expires_at: Some(record.expires_at),
            time_remaining_ms: record.remaining_ms_at(now),
        }
    }

    /// True when no record backed this status
    pub fn is_absent(&self) -> bool {
        self.session_id.is_none()
    }
}
