//! Device model - client installations bound to a principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Keys a client may send to describe its device. `firebase_token` and
/// `device_token` are accepted as aliases for `push_token`.
pub const DEVICE_METADATA_KEYS: &[&str] = &[
    "name",
    "os",
    "os_version",
    "app_version",
    "device_id",
    "device_type",
    "push_token",
    "firebase_token",
    "device_token",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: Uuid,
    /// Public identifier handed to the client.
    pub uuid: Uuid,
    pub principal_id: Uuid,
    pub name: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub push_token: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Device {
    pub fn new(principal_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            uuid: Uuid::new_v4(),
            principal_id,
            name: None,
            os: None,
            os_version: None,
            app_version: None,
            device_id: None,
            device_type: None,
            push_token: None,
            last_login: None,
            created_utc: Utc::now(),
        }
    }

    /// Copy known metadata keys from request data onto the device.
    /// Unknown keys and non-scalar values are ignored.
    pub fn apply_metadata(&mut self, data: &Map<String, Value>) {
        for key in DEVICE_METADATA_KEYS {
            let Some(value) = data.get(*key).and_then(scalar_string) else {
                continue;
            };
            match *key {
                "name" => self.name = Some(value),
                "os" => self.os = Some(value),
                "os_version" => self.os_version = Some(value),
                "app_version" => self.app_version = Some(value),
                "device_id" => self.device_id = Some(value),
                "device_type" => self.device_type = Some(value),
                _ => self.push_token = Some(value),
            }
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.device_type.clone())
            .unwrap_or_else(|| "unknown device".to_string())
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
