//! Principal model - the authenticated user identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Authenticated identity. Host-specific attributes live in `profile`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_superuser: bool,
    pub is_active: bool,
    /// `None` when the host never tracked email verification.
    pub email_verified: Option<bool>,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    #[serde(default)]
    pub profile: Map<String, Value>,
}

impl Principal {
    /// Create a new active principal.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            is_superuser: false,
            is_active: true,
            email_verified: Some(false),
            last_login: None,
            date_joined: Utc::now(),
            profile: Map::new(),
        }
    }

    pub fn superuser(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(username, email)
        }
    }

    /// Current value of a writable field, rendered as JSON.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "username" => Some(Value::String(self.username.clone())),
            "email" => Some(Value::String(self.email.clone())),
            _ => self.profile.get(key).cloned(),
        }
    }

    /// Assign a writable field. Core string fields only accept strings.
    pub fn set_field(&mut self, key: &str, value: Value) -> bool {
        match key {
            "username" | "email" => match value {
                Value::String(s) => {
                    if key == "username" {
                        self.username = s;
                    } else {
                        self.email = s.to_lowercase();
                    }
                    true
                }
                _ => false,
            },
            _ => {
                self.profile.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Profile view. `fields` restricts the keys returned.
    pub fn to_profile(&self, fields: Option<&[String]>) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(self.id.to_string()));
        out.insert("username".into(), Value::String(self.username.clone()));
        out.insert("email".into(), Value::String(self.email.clone()));
        out.insert(
            "email_verified".into(),
            self.email_verified.map(Value::Bool).unwrap_or(Value::Null),
        );
        out.insert(
            "last_login".into(),
            self.last_login
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        out.insert(
            "date_joined".into(),
            Value::String(self.date_joined.to_rfc3339()),
        );
        for (key, value) in &self.profile {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }

        if let Some(fields) = fields {
            out.retain(|key, _| fields.iter().any(|f| f == key));
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_field_lowercases_email() {
        let mut p = Principal::new("alice", "alice@x.io");
        assert!(p.set_field("email", json!("Alice@New.IO")));
        assert_eq!(p.email, "alice@new.io");
    }

    #[test]
    fn test_set_core_field_rejects_non_string() {
        let mut p = Principal::new("alice", "alice@x.io");
        assert!(!p.set_field("username", json!(12)));
        assert_eq!(p.username, "alice");
    }

    #[test]
    fn test_profile_field_filter() {
        let mut p = Principal::new("alice", "alice@x.io");
        p.set_field("first_name", json!("Alice"));

        let view = p.to_profile(Some(&["first_name".to_string(), "email".to_string()]));
        let obj = view.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["first_name"], json!("Alice"));
        assert!(!obj.contains_key("username"));
    }
}
