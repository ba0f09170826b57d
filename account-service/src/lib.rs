pub mod config;
pub mod handlers;
pub mod models;
pub mod params;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::AccountConfig;
use crate::services::notifications::{
    AccountEvent, NotificationDispatcher, NotificationQueue, NotificationWorker,
};
use crate::services::{
    AccountError, AccountStore, CacheStore, RbacService, ScopeRegistry, SecureCache, TokenIssuer,
    VerificationEngine,
};

/// Shared handles of the account core. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: AccountConfig,
    pub store: Arc<dyn AccountStore>,
    pub cache: Arc<dyn CacheStore>,
    pub secure_cache: SecureCache,
    pub scopes: Arc<ScopeRegistry>,
    pub verification: VerificationEngine,
    pub rbac: RbacService,
    pub tokens: TokenIssuer,
    pub events: NotificationQueue,
}

impl AppState {
    /// Wire the core over the given collaborators. The returned receiver
    /// feeds a [`NotificationWorker`].
    pub fn new(
        config: AccountConfig,
        store: Arc<dyn AccountStore>,
        cache: Arc<dyn CacheStore>,
        scopes: ScopeRegistry,
    ) -> (Self, UnboundedReceiver<AccountEvent>) {
        let (events, receiver) = NotificationQueue::channel();
        let scopes = Arc::new(scopes);

        let verification = VerificationEngine::new(
            store.clone(),
            cache.clone(),
            events.clone(),
            config.clone(),
        );
        let rbac = RbacService::new(
            store.clone(),
            scopes.clone(),
            config.rbac.auto_register_permissions,
        );
        let tokens = TokenIssuer::new(store.clone(), verification.clone(), config.tokens.clone());
        let secure_cache = SecureCache::new(cache.clone(), config.secure_cache_secret.clone());

        let state = Self {
            config,
            store,
            cache,
            secure_cache,
            scopes,
            verification,
            rbac,
            tokens,
            events,
        };
        (state, receiver)
    }

    /// Startup work run once before serving. Registers the configured
    /// client application.
    pub async fn bootstrap(&self) -> Result<(), AccountError> {
        self.tokens.seed_client().await?;
        Ok(())
    }

    pub fn notification_worker(&self, dispatcher: Arc<NotificationDispatcher>) -> NotificationWorker {
        NotificationWorker::new(
            self.store.clone(),
            self.cache.clone(),
            dispatcher,
            self.config.clone(),
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::http::health_check))
        .route("/metrics", get(handlers::http::metrics))
        .route("/account/login", post(handlers::http::login_start))
        .route("/account/token", post(handlers::http::exchange_code))
        .route("/account/logout", post(handlers::http::logout))
        .route(
            "/account/profile",
            get(handlers::http::profile).patch(handlers::http::update_profile),
        )
        .route("/account/delete", post(handlers::http::delete_account))
        .with_state(state)
}
