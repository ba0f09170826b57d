//! Test helper module for account-service integration tests.
//!
//! Wires the core over in-memory collaborators and mock providers.

#![allow(dead_code)]

use account_service::{
    config::{AccountConfig, Environment},
    handlers::{self, RawRequest},
    models::{Principal, Project, ProjectMembership},
    services::{
        notifications::{
            AccountEvent, MockEmailProvider, MockPushProvider, NotificationDispatcher,
            NotificationWorker,
        },
        AccountError, CacheStore, MemoryCache, MemoryStore, ScopeRegistry, StaticScopeResolver,
    },
    AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub const CLIENT_ID: &str = "app";
pub const CLIENT_SECRET: &str = "secret";
pub const PROJECT_KIND: &str = "project";

pub fn test_config() -> AccountConfig {
    let mut config = AccountConfig::default();
    config.rbac.project_scope_kind = Some(PROJECT_KIND.to_string());
    config.email.enabled = true;
    config.email.debug_enabled = true;
    config
}

pub fn prod_config() -> AccountConfig {
    let mut config = test_config();
    config.environment = Environment::Prod;
    config.secure_cache_secret = "test-secret".to_string();
    config
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub email: Arc<MockEmailProvider>,
    pub push: Arc<MockPushProvider>,
    pub projects: Arc<StaticScopeResolver>,
    worker: NotificationWorker,
    receiver: UnboundedReceiver<AccountEvent>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AccountConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let email = Arc::new(MockEmailProvider::new(true));
        let push = Arc::new(MockPushProvider::new(true));
        let projects = Arc::new(StaticScopeResolver::new(PROJECT_KIND));

        let scopes = ScopeRegistry::new(config.rbac.project_scope_kind.clone())
            .register(PROJECT_KIND, projects.clone());
        let (state, receiver) =
            AppState::new(config.clone(), store.clone(), cache.clone(), scopes);

        let dispatcher = NotificationDispatcher::new(
            email.clone(),
            push.clone(),
            store.clone(),
            config.email.clone(),
            config.is_debug(),
        );
        let worker = state.notification_worker(Arc::new(dispatcher));

        state
            .tokens
            .register_client(CLIENT_ID, CLIENT_SECRET, "Test app")
            .await
            .expect("Failed to register client");

        Self {
            state,
            store,
            cache,
            email,
            push,
            projects,
            worker,
            receiver,
        }
    }

    /// Deliver every queued notification.
    pub async fn deliver(&mut self) -> usize {
        self.worker.drain(&mut self.receiver).await
    }

    pub async fn cached_code(&self, principal: &Principal) -> Option<String> {
        let key = self.state.config.code_cache_key(&principal.id);
        self.cache.get(&key).await.expect("Cache read failed")
    }

    pub async fn principal(&self, username: &str) -> Principal {
        use account_service::services::AccountStore;
        self.store
            .find_principal_by_username(username)
            .await
            .expect("Store read failed")
            .expect("Principal missing")
    }

    pub async fn login(&self, email: &str, device: Value) -> Result<Value, AccountError> {
        let req = RawRequest::json(&json!({ "email": email, "device": device }))
            .with_header("x-forwarded-for", "203.0.113.7");
        handlers::login_start(&self.state, &req).await
    }

    pub async fn exchange(
        &self,
        email: &str,
        code: &str,
        device_uuid: Option<&str>,
    ) -> Result<Value, AccountError> {
        let mut body = json!({
            "email": email,
            "code": code,
            "client_id": CLIENT_ID,
            "client_secret": CLIENT_SECRET,
        });
        if let Some(uuid) = device_uuid {
            body["device_uuid"] = json!(uuid);
        }
        handlers::exchange_code(&self.state, &RawRequest::json(&body)).await
    }

    /// Log `email` in end to end. Returns the access token and device uuid.
    pub async fn sign_in(&self, email: &str) -> (String, String) {
        let started = self.login(email, json!({})).await.expect("Login failed");
        let device_uuid = started["device_uuid"]
            .as_str()
            .expect("No device uuid")
            .to_string();

        let principal = self.principal(email).await;
        let code = self.cached_code(&principal).await.expect("No cached code");
        let tokens = self
            .exchange(email, &code, Some(&device_uuid))
            .await
            .expect("Exchange failed");
        let token = tokens["access_token"]
            .as_str()
            .expect("No access token")
            .to_string();
        (token, device_uuid)
    }

    pub fn add_project(&self, id: &str) -> Project {
        self.projects
            .add_project(id, Some(id))
            .expect("Failed to add project")
    }

    pub fn add_member(&self, principal: &Principal, project: &Project) {
        self.projects
            .add_membership(principal.id, project, ProjectMembership::default())
            .expect("Failed to add membership");
    }
}
