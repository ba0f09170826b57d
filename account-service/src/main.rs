use account_service::{
    build_router,
    config::AccountConfig,
    services::{
        metrics,
        notifications::{FcmProvider, NotificationDispatcher, SmtpEmailProvider},
        CacheStore, MemoryCache, MemoryStore, RedisCache, ScopeRegistry, StaticScopeResolver,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = AccountConfig::from_env()?;
    config.validate()?;

    init_tracing(&config.common.service_name, &config.common.log_level);

    metrics::init_metrics()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to register metrics: {}", e)))?;

    tracing::info!(
        service = %config.common.service_name,
        environment = ?config.environment,
        "Starting account service"
    );

    let cache: Arc<dyn CacheStore> = match &config.redis {
        Some(redis) => {
            let cache = RedisCache::new(redis).await.map_err(AppError::CacheError)?;
            tracing::info!("Redis cache initialized");
            Arc::new(cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };

    // The standalone binary has no host project model
    let mut scopes = ScopeRegistry::new(config.rbac.project_scope_kind.clone());
    if let Some(kind) = config.rbac.project_scope_kind.clone() {
        scopes = scopes.register(kind.clone(), Arc::new(StaticScopeResolver::new(kind)));
    }

    let store = Arc::new(MemoryStore::new());
    let (state, receiver) = AppState::new(config.clone(), store.clone(), cache, scopes);
    state.bootstrap().await?;

    let email = SmtpEmailProvider::new(config.email.clone())
        .map_err(|e| AppError::EmailError(e.to_string()))?;
    let dispatcher = NotificationDispatcher::new(
        Arc::new(email),
        Arc::new(FcmProvider::new(config.push.clone())),
        store,
        config.email.clone(),
        config.is_debug(),
    );
    let worker = state.notification_worker(Arc::new(dispatcher)).spawn(receiver);
    tracing::info!("Notification worker started");

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    worker.abort();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
