//! Scope models - projects are resolved through a host-supplied registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a scope entity of a registered kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeRef {
    pub kind: String,
    pub id: String,
}

impl ScopeRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Project used as the scope of a permission check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub scope: ScopeRef,
    pub name: Option<String>,
}

impl Project {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: ScopeRef::new(kind, id),
            name: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.scope.id
    }
}

/// Membership of a principal in a project. Each flag is optional because
/// hosts differ in what they track.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectMembership {
    pub enabled: Option<bool>,
    pub is_superuser: Option<bool>,
    pub role: Option<String>,
}
