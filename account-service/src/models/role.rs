//! Role model - global and scope-bound roles with permission mappings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scope::ScopeRef;

/// Role entity. `scope` is `None` for global roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    /// Always stored lowercased.
    pub codename: String,
    pub scope: Option<ScopeRef>,
    pub enabled: bool,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, codename: &str, scope: Option<ScopeRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            codename: codename.to_lowercase(),
            scope,
            enabled: true,
            created_utc: Utc::now(),
        }
    }

    /// Global role with a name derived from its codename.
    pub fn global(codename: &str) -> Self {
        Self::new(humanize(codename), codename, None)
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_none()
    }
}

/// Permission catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Permission {
    pub id: Uuid,
    /// Always stored lowercased.
    pub codename: String,
    pub name: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    pub fn new(codename: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            codename: codename.to_lowercase(),
            name: humanize(codename),
            description: None,
            created_utc: Utc::now(),
        }
    }
}

/// Role to permission link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub display_name: Option<String>,
}

/// Principal to role assignment, optionally bound to a scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRole {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub role_id: Uuid,
    pub scope: Option<ScopeRef>,
    pub created_utc: DateTime<Utc>,
}

impl UserRole {
    pub fn new(principal_id: Uuid, role_id: Uuid, scope: Option<ScopeRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id,
            role_id,
            scope,
            created_utc: Utc::now(),
        }
    }
}

/// `can_edit_doc` -> `Can edit doc`.
pub fn humanize(codename: &str) -> String {
    let spaced = codename.replace('_', " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
