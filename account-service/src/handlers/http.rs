//! Axum adapter mounting the account entry points.

use axum::{
    async_trait,
    body::to_bytes,
    extract::{ConnectInfo, FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use std::collections::HashMap;
use std::net::SocketAddr;

use super::account;
use super::request::RawRequest;
use crate::services::error::AccountError;
use crate::services::metrics;
use crate::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Extractor turning an axum request into a [`RawRequest`].
pub struct Raw(pub RawRequest);

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for Raw {
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read body: {}", e)))?;

        Ok(Raw(RawRequest {
            method: parts.method,
            content_type,
            query: parts.uri.query().unwrap_or_default().to_string(),
            body: body.to_vec(),
            files: HashMap::new(),
            headers: parts.headers,
            remote_addr,
        }))
    }
}

fn respond(result: Result<Value, AccountError>) -> Result<Json<Value>, AppError> {
    match result {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            match &e {
                AccountError::Storage(_)
                | AccountError::Cache(_)
                | AccountError::Internal(_)
                | AccountError::Configuration(_) => {
                    tracing::error!(error = %e, kind = e.kind(), "Request failed")
                }
                _ => tracing::info!(kind = e.kind(), "Request rejected"),
            }
            Err(e.into())
        }
    }
}

pub async fn login_start(
    State(state): State<AppState>,
    Raw(req): Raw,
) -> Result<Json<Value>, AppError> {
    respond(account::login_start(&state, &req).await)
}

pub async fn exchange_code(
    State(state): State<AppState>,
    Raw(req): Raw,
) -> Result<Json<Value>, AppError> {
    respond(account::exchange_code(&state, &req).await)
}

pub async fn logout(
    State(state): State<AppState>,
    Raw(req): Raw,
) -> Result<Json<Value>, AppError> {
    respond(account::logout(&state, &req).await)
}

pub async fn profile(
    State(state): State<AppState>,
    Raw(req): Raw,
) -> Result<Json<Value>, AppError> {
    respond(account::profile(&state, &req).await)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Raw(req): Raw,
) -> Result<Json<Value>, AppError> {
    respond(account::update_profile(&state, &req).await)
}

pub async fn delete_account(
    State(state): State<AppState>,
    Raw(req): Raw,
) -> Result<Json<Value>, AppError> {
    respond(account::delete_account(&state, &req).await)
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Cache health check failed");
        AppError::CacheError(e)
    })?;

    Ok(Json(json!({
        "status": "healthy",
        "service": state.config.common.service_name,
        "environment": format!("{:?}", state.config.environment),
    })))
}

pub async fn metrics() -> impl IntoResponse {
    metrics::gather_metrics()
}
