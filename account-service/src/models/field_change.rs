//! Change journal entries for updated entity fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields never written to the change journal.
pub const UNTRACKED_FIELDS: &[&str] = &["password", "token", "updated_fields"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub id: Uuid,
    pub entity: String,
    pub entity_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_utc: DateTime<Utc>,
}

impl FieldChange {
    pub fn new(
        entity: impl Into<String>,
        entity_id: Uuid,
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity: entity.into(),
            entity_id,
            field: field.into(),
            old_value,
            new_value,
            changed_utc: Utc::now(),
        }
    }

    pub fn is_tracked(field: &str) -> bool {
        !UNTRACKED_FIELDS.contains(&field)
    }
}
