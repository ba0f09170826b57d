//! Notification delivery records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One push attempt for one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushNotificationRecord {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub device_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl PushNotificationRecord {
    pub fn new(
        principal_id: Uuid,
        device_id: Uuid,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id,
            device_id,
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
            message_id: None,
            error: None,
            created_utc: Utc::now(),
        }
    }

    pub fn delivered(&self) -> bool {
        self.message_id.is_some()
    }
}

/// Result of an email send. `reason_code` is set when nothing was sent
/// or the provider failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailOutcome {
    pub ok: bool,
    pub reason_code: Option<String>,
    pub message: Option<String>,
}

impl EmailOutcome {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            ok: true,
            reason_code: None,
            message: message_id,
        }
    }

    pub fn skipped(reason_code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason_code: Some(reason_code.to_string()),
            message: Some(message.into()),
        }
    }
}
