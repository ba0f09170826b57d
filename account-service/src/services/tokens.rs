//! Code-for-token exchange, bearer resolution and revocation.

use chrono::Utc;
use service_core::utils::signature::{digests_match, sha256_hex};
use std::sync::Arc;
use uuid::Uuid;

use super::error::AccountError;
use super::metrics;
use super::store::AccountStore;
use super::verification::VerificationEngine;
use crate::config::TokenConfig;
use crate::models::{AccessToken, IssuedTokens, OAuthClient, Principal, RefreshToken};
use crate::utils::generate_token;

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn AccountStore>,
    verification: VerificationEngine,
    config: TokenConfig,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn AccountStore>,
        verification: VerificationEngine,
        config: TokenConfig,
    ) -> Self {
        Self {
            store,
            verification,
            config,
        }
    }

    /// Exchange the principal's latest verification code for a token pair.
    ///
    /// The code is claimed before any token is minted, so concurrent calls
    /// with the same code yield exactly one token pair.
    #[tracing::instrument(skip(self, principal, code, client_secret), fields(principal_id = %principal.id))]
    pub async fn authenticate(
        &self,
        principal: &Principal,
        code: &str,
        client_id: &str,
        client_secret: &str,
        device_uuid: Option<Uuid>,
    ) -> Result<IssuedTokens, AccountError> {
        let result = self
            .exchange(principal, code, client_id, client_secret, device_uuid)
            .await;

        match &result {
            Ok(_) => {
                metrics::record_token_issuance("issued");
                tracing::info!("Tokens issued");
            }
            Err(e) => {
                metrics::record_token_issuance(e.kind());
                tracing::warn!(kind = e.kind(), "Token issuance rejected");
            }
        }
        result
    }

    async fn exchange(
        &self,
        principal: &Principal,
        code: &str,
        client_id: &str,
        client_secret: &str,
        device_uuid: Option<Uuid>,
    ) -> Result<IssuedTokens, AccountError> {
        let client = self
            .store
            .find_client(client_id)
            .await?
            .ok_or(AccountError::InvalidClient)?;
        if !digests_match(&client.client_secret_hash, &sha256_hex(client_secret)) {
            return Err(AccountError::InvalidSecret);
        }

        let verification_code = self
            .verification
            .latest_code(principal.id)
            .await?
            .ok_or(AccountError::NoCodeRequested)?;

        if !self
            .verification
            .validate(&verification_code, Some(code), device_uuid)
            .await?
        {
            return Err(AccountError::InvalidCode);
        }

        if !self.verification.mark_verified(&verification_code).await? {
            return Err(AccountError::InvalidCode);
        }

        let now = Utc::now();
        if let Some(device_id) = verification_code.device_id {
            if let Some(mut device) = self.store.find_device(device_id).await? {
                device.last_login = Some(now);
                self.store.update_device(&device).await?;
            }
        }

        let mut updated = self
            .store
            .find_principal(principal.id)
            .await?
            .unwrap_or_else(|| principal.clone());
        updated.last_login = Some(now);
        if updated.email_verified.is_some() {
            updated.email_verified = Some(true);
        }
        self.store.update_principal(&updated).await?;

        let access = AccessToken::new(
            generate_token(),
            principal.id,
            client.id,
            self.config.access_token_expire_seconds,
        );
        let refresh = RefreshToken::new(generate_token(), &access);
        self.store.insert_access_token(&access).await?;
        self.store.insert_refresh_token(&refresh).await?;

        Ok(IssuedTokens::new(&access, &refresh))
    }

    /// Principal owning a live access token. Expired tokens are removed.
    pub async fn resolve_bearer(&self, token: &str) -> Result<Option<Principal>, AccountError> {
        let Some(access) = self.store.find_access_token(token).await? else {
            return Ok(None);
        };

        if access.is_expired() {
            tracing::debug!(token_id = %access.id, "Access token expired, deleting");
            self.store.delete_access_token(access.id).await?;
            return Ok(None);
        }

        let principal = self.store.find_principal(access.principal_id).await?;
        Ok(principal.filter(|p| p.is_active))
    }

    /// Delete an access token and its refresh tokens. Unknown tokens are ignored.
    pub async fn revoke(&self, token: &str) -> Result<(), AccountError> {
        if let Some(access) = self.store.find_access_token(token).await? {
            self.store.delete_access_token(access.id).await?;
            tracing::info!(principal_id = %access.principal_id, "Access token revoked");
        }
        Ok(())
    }

    pub async fn register_client(
        &self,
        client_id: &str,
        client_secret: &str,
        name: &str,
    ) -> Result<OAuthClient, AccountError> {
        if self.store.find_client(client_id).await?.is_some() {
            return Err(AccountError::BadRequest(format!(
                "client {} already exists",
                client_id
            )));
        }
        let client = OAuthClient::new(client_id, client_secret, name);
        self.store.insert_client(&client).await?;
        Ok(client)
    }

    /// Register the configured client application unless it already exists.
    /// Returns whether a client was created.
    pub async fn seed_client(&self) -> Result<bool, AccountError> {
        let Some(seed) = &self.config.seed_client else {
            return Ok(false);
        };
        if self.store.find_client(&seed.client_id).await?.is_some() {
            return Ok(false);
        }

        self.register_client(&seed.client_id, &seed.client_secret, &seed.name)
            .await?;
        tracing::info!(client_id = %seed.client_id, "Client application seeded");
        Ok(true)
    }
}
