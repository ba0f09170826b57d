//! OAuth client model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use service_core::utils::signature::sha256_hex;

/// Registered application allowed to exchange verification codes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    pub client_secret_hash: String,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: &str, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            client_secret_hash: sha256_hex(client_secret),
            name: name.into(),
            created_utc: Utc::now(),
        }
    }
}
