//! One-time verification codes: issuance policy, lazy expiry and one-shot claiming.

use std::sync::Arc;
use uuid::Uuid;

use super::cache::CacheStore;
use super::error::AccountError;
use super::metrics;
use super::notifications::{AccountEvent, NotificationQueue};
use super::store::AccountStore;
use crate::config::AccountConfig;
use crate::models::{Device, Principal, VerificationCode};
use crate::utils::{generate_code, hash_secret, verify_secret, Secret, SecretHash};

/// How the plaintext value of an issued code was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePolicy {
    Tester,
    Cached,
    Generated,
    Debug,
}

impl CodePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePolicy::Tester => "tester",
            CodePolicy::Cached => "cached",
            CodePolicy::Generated => "generated",
            CodePolicy::Debug => "debug",
        }
    }
}

/// Exact match, or a prefix match when the pattern ends with `*`.
pub fn matches_tester_pattern(email: &str, patterns: &[String]) -> bool {
    let email = email.to_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_suffix('*') {
            Some(prefix) => email.starts_with(prefix),
            None => !pattern.is_empty() && email == pattern,
        }
    })
}

#[derive(Clone)]
pub struct VerificationEngine {
    store: Arc<dyn AccountStore>,
    cache: Arc<dyn CacheStore>,
    events: NotificationQueue,
    config: AccountConfig,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: Arc<dyn CacheStore>,
        events: NotificationQueue,
        config: AccountConfig,
    ) -> Self {
        Self {
            store,
            cache,
            events,
            config,
        }
    }

    fn ttl_seconds(&self) -> u64 {
        self.config.verification.expire_seconds.max(1) as u64
    }

    async fn choose_value(
        &self,
        principal: &Principal,
        cache_key: &str,
    ) -> Result<(String, CodePolicy), AccountError> {
        let verification = &self.config.verification;

        if matches_tester_pattern(&principal.email, &verification.tester_emails) {
            return Ok((verification.tester_code.clone(), CodePolicy::Tester));
        }

        if self.config.is_debug() {
            return Ok((verification.debug_code.clone(), CodePolicy::Debug));
        }

        match self.cache.get(cache_key).await.map_err(AccountError::Cache)? {
            Some(cached) if !cached.is_empty() => Ok((cached, CodePolicy::Cached)),
            _ => Ok((generate_code(), CodePolicy::Generated)),
        }
    }

    /// Create a code for `principal`, optionally bound to `device`.
    ///
    /// The plaintext is cached for the expiry window so the notification
    /// worker can deliver it; only its hash is persisted.
    #[tracing::instrument(skip(self, principal, device), fields(principal_id = %principal.id))]
    pub async fn issue(
        &self,
        principal: &Principal,
        device: Option<&Device>,
        ip: Option<String>,
    ) -> Result<VerificationCode, AccountError> {
        let cache_key = self.config.code_cache_key(&principal.id);
        let (value, policy) = self.choose_value(principal, &cache_key).await?;

        self.cache
            .set(&cache_key, &value, self.ttl_seconds())
            .await
            .map_err(AccountError::Cache)?;

        let hash = hash_secret(&Secret::new(value)).map_err(AccountError::Internal)?;
        let code = VerificationCode::new(
            principal.id,
            device.map(|d| d.id),
            hash.into_string(),
            ip,
        );
        self.store.insert_code(&code).await?;

        metrics::record_code_issued(policy.as_str());
        tracing::info!(code_id = %code.id, policy = policy.as_str(), "Verification code issued");

        self.events.emit(AccountEvent::VerificationCodeIssued {
            principal_id: principal.id,
            code_id: code.id,
        });

        Ok(code)
    }

    /// Most recent code for the principal, verified or not.
    pub async fn latest_code(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<VerificationCode>, AccountError> {
        Ok(self.store.latest_code_for(principal_id).await?)
    }

    /// Check `candidate` against `code`. Wrong values never mutate state;
    /// an expired code is deleted.
    #[tracing::instrument(skip(self, code, candidate), fields(code_id = %code.id))]
    pub async fn validate(
        &self,
        code: &VerificationCode,
        candidate: Option<&str>,
        device_uuid: Option<Uuid>,
    ) -> Result<bool, AccountError> {
        let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
            return Ok(false);
        };
        if code.code_hash.is_empty() {
            return Ok(false);
        }

        if let Some(device_id) = code.device_id {
            let bound = self.store.find_device(device_id).await?;
            let matches = match (bound, device_uuid) {
                (Some(device), Some(uuid)) => device.uuid == uuid,
                _ => false,
            };
            if !matches {
                tracing::debug!("Device does not match the code binding");
                return Ok(false);
            }
        }

        if code.is_expired(self.config.verification.expire_seconds) {
            tracing::info!("Verification code expired, deleting");
            self.store.delete_code(code.id).await?;
            return Ok(false);
        }

        Ok(verify_secret(
            &Secret::new(candidate),
            &SecretHash::new(code.code_hash.clone()),
        ))
    }

    /// Atomically mark `code` verified. Only the first caller gets `true`.
    pub async fn mark_verified(&self, code: &VerificationCode) -> Result<bool, AccountError> {
        let claimed = self.store.claim_code(code.id).await?;
        if claimed {
            self.events.emit(AccountEvent::NewLogin {
                principal_id: code.principal_id,
                code_id: code.id,
            });
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::services::cache::MemoryCache;
    use crate::services::memory_store::MemoryStore;
    use chrono::{Duration, Utc};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn engine(
        config: AccountConfig,
    ) -> (
        VerificationEngine,
        Arc<MemoryStore>,
        Arc<MemoryCache>,
        UnboundedReceiver<AccountEvent>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let (events, rx) = NotificationQueue::channel();
        let engine = VerificationEngine::new(store.clone(), cache.clone(), events, config);
        (engine, store, cache, rx)
    }

    fn prod_config() -> AccountConfig {
        let mut config = AccountConfig::default();
        config.environment = Environment::Prod;
        config
    }

    #[test]
    fn test_tester_patterns() {
        let patterns = vec!["qa_*".to_string(), "ops@example.com".to_string()];
        assert!(matches_tester_pattern("qa_bot@x.com", &patterns));
        assert!(matches_tester_pattern("OPS@example.com", &patterns));
        assert!(!matches_tester_pattern("alice@example.com", &patterns));
        assert!(!matches_tester_pattern("ops@example.com.evil", &patterns));
    }

    #[tokio::test]
    async fn test_debug_mode_uses_fixed_code() {
        let (engine, _, cache, mut rx) = engine(AccountConfig::default());
        let alice = Principal::new("alice", "alice@example.com");

        let code = engine.issue(&alice, None, None).await.unwrap();

        let key = engine.config.code_cache_key(&alice.id);
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("123456"));
        assert!(engine.validate(&code, Some("123456"), None).await.unwrap());
        assert_eq!(
            rx.try_recv().unwrap(),
            AccountEvent::VerificationCodeIssued {
                principal_id: alice.id,
                code_id: code.id
            }
        );
    }

    #[tokio::test]
    async fn test_tester_code_wins_over_cache() {
        let mut config = prod_config();
        config.verification.tester_emails = vec!["qa_*".to_string()];
        config.verification.tester_code = "000111".to_string();
        let (engine, _, cache, _rx) = engine(config);
        let bot = Principal::new("qa_bot", "qa_bot@x.com");

        let key = engine.config.code_cache_key(&bot.id);
        cache.set(&key, "999999", 900).await.unwrap();

        let code = engine.issue(&bot, None, None).await.unwrap();
        assert!(engine.validate(&code, Some("000111"), None).await.unwrap());
        assert!(!engine.validate(&code, Some("999999"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_prod_reuses_cached_value() {
        let (engine, _, _, _rx) = engine(prod_config());
        let alice = Principal::new("alice", "alice@example.com");

        let first = engine.issue(&alice, None, None).await.unwrap();
        let key = engine.config.code_cache_key(&alice.id);
        let plain = engine.cache.get(&key).await.unwrap().unwrap();
        assert_eq!(plain.len(), 6);
        assert!(plain.chars().all(|c| c.is_ascii_digit()));

        let second = engine.issue(&alice, None, None).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.code_hash, plain);
        assert!(engine.validate(&second, Some(&plain), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_code_does_not_mutate() {
        let (engine, store, _, _rx) = engine(AccountConfig::default());
        let alice = Principal::new("alice", "alice@example.com");
        let code = engine.issue(&alice, None, None).await.unwrap();

        assert!(!engine.validate(&code, Some("654321"), None).await.unwrap());
        assert!(!engine.validate(&code, None, None).await.unwrap());

        let stored = store.find_code(code.id).await.unwrap().unwrap();
        assert!(!stored.verified);
    }

    #[tokio::test]
    async fn test_expired_code_is_deleted() {
        let (engine, store, _, _rx) = engine(AccountConfig::default());
        let alice = Principal::new("alice", "alice@example.com");

        let hash = hash_secret(&Secret::new("123456")).unwrap();
        let mut code = VerificationCode::new(alice.id, None, hash.into_string(), None);
        code.created_utc = Utc::now() - Duration::seconds(901);
        store.insert_code(&code).await.unwrap();

        assert!(!engine.validate(&code, Some("123456"), None).await.unwrap());
        assert!(store.find_code(code.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_device_binding() {
        let (engine, store, _, _rx) = engine(AccountConfig::default());
        let alice = Principal::new("alice", "alice@example.com");
        let device = Device::new(alice.id);
        store.insert_device(&device).await.unwrap();

        let code = engine.issue(&alice, Some(&device), None).await.unwrap();

        assert!(!engine.validate(&code, Some("123456"), None).await.unwrap());
        assert!(!engine
            .validate(&code, Some("123456"), Some(Uuid::new_v4()))
            .await
            .unwrap());
        assert!(engine
            .validate(&code, Some("123456"), Some(device.uuid))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_code_unusable_after_device_removed() {
        let (engine, store, _, _rx) = engine(AccountConfig::default());
        let alice = Principal::new("alice", "alice@example.com");
        let device = Device::new(alice.id);
        store.insert_device(&device).await.unwrap();
        let code = engine.issue(&alice, Some(&device), None).await.unwrap();

        store.delete_device(device.id).await.unwrap();

        assert!(engine.latest_code(alice.id).await.unwrap().is_none());
        // A stale copy of the record still fails closed
        assert!(!engine.validate(&code, Some("123456"), None).await.unwrap());
        assert!(!engine
            .validate(&code, Some("123456"), Some(device.uuid))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mark_verified_once() {
        let (engine, _, _, mut rx) = engine(AccountConfig::default());
        let alice = Principal::new("alice", "alice@example.com");
        let code = engine.issue(&alice, None, None).await.unwrap();
        let _ = rx.try_recv();

        assert!(engine.mark_verified(&code).await.unwrap());
        assert!(!engine.mark_verified(&code).await.unwrap());

        assert_eq!(
            rx.try_recv().unwrap(),
            AccountEvent::NewLogin {
                principal_id: alice.id,
                code_id: code.id
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
