//! Access and refresh token models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessToken {
    pub id: Uuid,
    pub token: String,
    pub principal_id: Uuid,
    pub client_id: Uuid,
    pub scope: String,
    pub expires: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(
        token: String,
        principal_id: Uuid,
        client_id: Uuid,
        lifetime_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token,
            principal_id,
            client_id,
            scope: "read write".to_string(),
            expires: now + Duration::seconds(lifetime_seconds),
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token: String,
    pub principal_id: Uuid,
    pub client_id: Uuid,
    pub access_token_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(token: String, access: &AccessToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            principal_id: access.principal_id,
            client_id: access.client_id,
            access_token_id: access.id,
            created_utc: Utc::now(),
        }
    }
}

/// Token pair returned to the client after a successful code exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: String,
    pub expires: DateTime<Utc>,
}

impl IssuedTokens {
    pub fn new(access: &AccessToken, refresh: &RefreshToken) -> Self {
        Self {
            access_token: access.token.clone(),
            refresh_token: refresh.token.clone(),
            token_type: "Bearer".to_string(),
            scope: access.scope.clone(),
            expires: access.expires,
        }
    }

    pub fn expires_in(&self) -> i64 {
        (self.expires - Utc::now()).num_seconds()
    }
}
