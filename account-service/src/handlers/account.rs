//! Account entry points: login, code exchange, logout, profile and deletion.
//!
//! Each function takes the shared state and a [`RawRequest`], runs it
//! through [`prepare`] and returns the JSON payload for the host to render.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::gate::{prepare, HandlerOptions, RequestContext};
use super::request::RawRequest;
use crate::models::{Device, FieldChange, Principal};
use crate::params::{ParamKind, ParamSpec};
use crate::services::error::AccountError;
use crate::AppState;

const PRINCIPAL_ENTITY: &str = "principal";

fn username_spec(state: &AppState) -> ParamSpec {
    let field = state.config.username_field.as_str();
    let kind = if field == "email" {
        ParamKind::Email
    } else {
        ParamKind::Str
    };
    ParamSpec::required(field, kind)
}

fn username_of<'a>(state: &AppState, ctx: &'a RequestContext) -> Result<&'a str, AccountError> {
    let field = state.config.username_field.as_str();
    ctx.params
        .str(field)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AccountError::BadRequest(format!("{} must be a string", field)))
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, AccountError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AccountError::NotFound(what.to_string()))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Write the fields `state` allows onto `principal`, journaling each change.
async fn apply_profile_fields<'a, I>(
    state: &AppState,
    principal: &mut Principal,
    fields: I,
    journal: bool,
) -> Result<usize, AccountError>
where
    I: Iterator<Item = (&'a String, Value)>,
{
    let email_is_login = state.config.username_field == "email";
    let mut changed = 0;

    for (key, value) in fields {
        if !state.config.profile.is_writable(key) {
            continue;
        }
        // The username mirrors the email when the email is the login key
        if email_is_login && key == "username" {
            continue;
        }

        let old = principal.field(key);
        if old.as_ref() == Some(&value) {
            continue;
        }

        let is_login_key = key == "username" || (email_is_login && key == "email");
        if is_login_key {
            let Some(candidate) = value.as_str() else {
                continue;
            };
            let candidate = if key == "email" {
                candidate.trim().to_lowercase()
            } else {
                candidate.to_string()
            };
            if candidate.is_empty() {
                continue;
            }
            if let Some(other) = state.store.find_principal_by_username(&candidate).await? {
                if other.id != principal.id {
                    return Err(AccountError::BadRequest(format!("{} already taken", key)));
                }
            }
        }

        if !principal.set_field(key, value) {
            continue;
        }
        if principal.field(key) == old {
            continue;
        }
        changed += 1;

        if journal {
            record_change(state, principal, key, old).await?;
        }

        if email_is_login && key == "email" {
            let previous = principal.field("username");
            principal.username = principal.email.clone();
            principal.email_verified = Some(false);
            if journal {
                record_change(state, principal, "username", previous).await?;
            }
        }
    }

    Ok(changed)
}

async fn record_change(
    state: &AppState,
    principal: &Principal,
    key: &str,
    old: Option<Value>,
) -> Result<(), AccountError> {
    if !FieldChange::is_tracked(key) {
        return Ok(());
    }
    let change = FieldChange::new(
        PRINCIPAL_ENTITY,
        principal.id,
        key,
        old.as_ref().and_then(scalar_text),
        principal.field(key).as_ref().and_then(scalar_text),
    );
    state.store.append_field_change(&change).await?;
    Ok(())
}

fn push_token_of(data: &Map<String, Value>) -> Option<String> {
    ["push_token", "firebase_token", "device_token"]
        .iter()
        .filter_map(|key| data.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

async fn resolve_login_device(
    state: &AppState,
    principal: &Principal,
    data: &Map<String, Value>,
) -> Result<Device, AccountError> {
    let uuid = data.get("uuid").and_then(Value::as_str).filter(|s| !s.is_empty());

    if let Some(raw) = uuid {
        let uuid = parse_uuid(raw, "Device")?;
        let mut device = state
            .store
            .find_device_by_uuid(principal.id, uuid)
            .await?
            .ok_or_else(|| AccountError::NotFound("Device".to_string()))?;
        device.apply_metadata(data);
        state.store.update_device(&device).await?;
        return Ok(device);
    }

    if let Some(token) = push_token_of(data) {
        if let Some(mut device) = state
            .store
            .find_device_by_push_token(principal.id, &token)
            .await?
        {
            device.apply_metadata(data);
            state.store.update_device(&device).await?;
            return Ok(device);
        }
    }

    let mut device = Device::new(principal.id);
    device.apply_metadata(data);
    state.store.insert_device(&device).await?;
    tracing::info!(principal_id = %principal.id, device_uuid = %device.uuid, "Device registered");
    Ok(device)
}

/// Start a login: get or create the principal, resolve the device and send
/// a verification code.
#[tracing::instrument(skip_all)]
pub async fn login_start(state: &AppState, req: &RawRequest) -> Result<Value, AccountError> {
    let options = HandlerOptions::new(vec![
        username_spec(state),
        ParamSpec::optional("device", ParamKind::Dict),
    ])
    .public();
    let ctx = prepare(state, req, &options).await?;
    let username = username_of(state, &ctx)?.to_string();

    let (mut principal, created) = match state.store.find_principal_by_username(&username).await? {
        Some(existing) => (existing, false),
        None => {
            let email = if state.config.username_field == "email" {
                username.clone()
            } else {
                String::new()
            };
            (Principal::new(username.clone(), email), true)
        }
    };

    if !principal.is_active {
        return Err(AccountError::Unauthenticated);
    }

    // Anonymous callers only seed a new principal, never rewrite one
    if created {
        let username_field = state.config.username_field.as_str();
        let fields = ctx
            .params
            .iter()
            .filter(|(key, _)| key.as_str() != username_field && key.as_str() != "device")
            .map(|(key, value)| (key, value.to_json()));
        apply_profile_fields(state, &mut principal, fields, false).await?;

        state.store.insert_principal(&principal).await?;
        tracing::info!(principal_id = %principal.id, "Principal created");
    }

    let device_data = ctx.params.object("device").cloned().unwrap_or_default();
    let device = match resolve_login_device(state, &principal, &device_data).await {
        Ok(device) => device,
        Err(e) => {
            if created {
                state.store.delete_principal(principal.id).await?;
            }
            return Err(e);
        }
    };

    state
        .verification
        .issue(&principal, Some(&device), ctx.ip.clone())
        .await?;

    Ok(json!({
        "message": "CODE SENT",
        "device_uuid": device.uuid,
    }))
}

/// Exchange a verification code for an access and refresh token.
#[tracing::instrument(skip_all)]
pub async fn exchange_code(state: &AppState, req: &RawRequest) -> Result<Value, AccountError> {
    let options = HandlerOptions::new(vec![
        username_spec(state),
        ParamSpec::required("code", ParamKind::Str),
        ParamSpec::required("client_id", ParamKind::Str),
        ParamSpec::required("client_secret", ParamKind::Str),
        ParamSpec::optional("device_uuid", ParamKind::Str),
    ])
    .public();
    let ctx = prepare(state, req, &options).await?;
    let username = username_of(state, &ctx)?;

    let principal = state
        .store
        .find_principal_by_username(username)
        .await?
        .ok_or_else(|| AccountError::NotFound("User".to_string()))?;

    let device_uuid = match ctx.params.str("device_uuid").filter(|s| !s.is_empty()) {
        Some(raw) => {
            let uuid = parse_uuid(raw, "Device")?;
            state
                .store
                .find_device_by_uuid(principal.id, uuid)
                .await?
                .ok_or_else(|| AccountError::NotFound("Device".to_string()))?;
            Some(uuid)
        }
        None => None,
    };

    let tokens = state
        .tokens
        .authenticate(
            &principal,
            ctx.params.str("code").unwrap_or_default(),
            ctx.params.str("client_id").unwrap_or_default(),
            ctx.params.str("client_secret").unwrap_or_default(),
            device_uuid,
        )
        .await?;

    let principal = state
        .store
        .find_principal(principal.id)
        .await?
        .unwrap_or(principal);

    Ok(json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "token_type": tokens.token_type,
        "scope": tokens.scope,
        "expires": tokens.expires.to_rfc3339(),
        "expires_in": tokens.expires_in(),
        "user": principal.to_profile(None),
    }))
}

/// Remove the named device and revoke the bearer token. Never fails on
/// missing state.
#[tracing::instrument(skip_all)]
pub async fn logout(state: &AppState, req: &RawRequest) -> Result<Value, AccountError> {
    let options =
        HandlerOptions::new(vec![ParamSpec::optional("device_uuid", ParamKind::Str)]).public();
    let ctx = prepare(state, req, &options).await?;

    if let (Some(principal), Some(raw)) = (&ctx.principal, ctx.params.str("device_uuid")) {
        if let Ok(uuid) = Uuid::parse_str(raw.trim()) {
            if let Some(device) = state.store.find_device_by_uuid(principal.id, uuid).await? {
                state.store.delete_device(device.id).await?;
            }
        }
    }

    if let Some(token) = ctx.bearer.as_deref() {
        state.tokens.revoke(token).await?;
    }

    Ok(json!({ "message": "LOGGED OUT" }))
}

#[tracing::instrument(skip_all)]
pub async fn profile(state: &AppState, req: &RawRequest) -> Result<Value, AccountError> {
    let options = HandlerOptions::new(vec![ParamSpec::optional("fields", ParamKind::List)]);
    let ctx = prepare(state, req, &options).await?;
    let principal = ctx.principal()?;

    let fields: Option<Vec<String>> = ctx.params.list("fields").map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect()
    });

    Ok(principal.to_profile(fields.as_deref()))
}

/// Write the supplied profile fields. Prohibited and unknown fields are ignored.
#[tracing::instrument(skip_all)]
pub async fn update_profile(state: &AppState, req: &RawRequest) -> Result<Value, AccountError> {
    let ctx = prepare(state, req, &HandlerOptions::default()).await?;
    let mut principal = ctx.principal()?.clone();

    let fields = ctx.params.iter().map(|(key, value)| (key, value.to_json()));
    let changed = apply_profile_fields(state, &mut principal, fields, true).await?;
    if changed > 0 {
        state.store.update_principal(&principal).await?;
        tracing::info!(principal_id = %principal.id, changed, "Profile updated");
    }

    Ok(principal.to_profile(None))
}

/// Delete the caller's account, confirmed by `sure=true` and a fresh code.
#[tracing::instrument(skip_all)]
pub async fn delete_account(state: &AppState, req: &RawRequest) -> Result<Value, AccountError> {
    let options = HandlerOptions::new(vec![
        ParamSpec::optional("sure", ParamKind::Bool),
        ParamSpec::required("code", ParamKind::Str),
        ParamSpec::optional("device_uuid", ParamKind::Str),
    ]);
    let ctx = prepare(state, req, &options).await?;
    let principal = ctx.principal()?;

    if !ctx.params.flag("sure") {
        return Err(AccountError::BadRequest(
            "account deletion must be confirmed with sure=true".to_string(),
        ));
    }

    let code = state
        .store
        .latest_unverified_code_for(principal.id)
        .await?
        .ok_or(AccountError::NoCodeRequested)?;

    let device_uuid = ctx
        .params
        .str("device_uuid")
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok());
    if !state
        .verification
        .validate(&code, ctx.params.str("code"), device_uuid)
        .await?
    {
        return Err(AccountError::InvalidCode);
    }

    state.store.delete_principal(principal.id).await?;
    tracing::info!(principal_id = %principal.id, "Account deleted");

    Ok(json!({ "message": "ACCOUNT DELETED" }))
}
