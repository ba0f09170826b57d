//! Verification code model - one-time login codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted verification code. Only the hash of the code is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationCode {
    pub id: Uuid,
    pub principal_id: Uuid,
    /// Internal id of the device the code was issued for.
    pub device_id: Option<Uuid>,
    pub code_hash: String,
    pub verified: bool,
    pub ip: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl VerificationCode {
    pub fn new(
        principal_id: Uuid,
        device_id: Option<Uuid>,
        code_hash: String,
        ip: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id,
            device_id,
            code_hash,
            verified: false,
            ip,
            created_utc: Utc::now(),
        }
    }

    /// Expired once more than `window_seconds` have passed since creation.
    pub fn is_expired_at(&self, window_seconds: i64, now: DateTime<Utc>) -> bool {
        now - self.created_utc > Duration::seconds(window_seconds)
    }

    pub fn is_expired(&self, window_seconds: i64) -> bool {
        self.is_expired_at(window_seconds, Utc::now())
    }
}
