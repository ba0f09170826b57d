//! Per-request preparation: authentication gate, project scope, parameter
//! pipeline and the optional permission check.

use chrono::{Offset, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::request::{client_ip, extract_data, RawRequest};
use crate::models::{Principal, Project};
use crate::params::{parse_params, ParamSpec, ParseContext, ParsedParams};
use crate::services::error::AccountError;
use crate::AppState;

/// Declares what an entry point needs from the request.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    pub params: Vec<ParamSpec>,
    /// Anonymous callers allowed.
    pub public: bool,
    pub project_required: bool,
    /// Action checked through `check_perm` for the caller.
    pub can_do: Option<String>,
    /// Reject the call when `can_do` is denied.
    pub perm_required: bool,
}

impl HandlerOptions {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn project_required(mut self) -> Self {
        self.project_required = true;
        self
    }

    pub fn can_do(mut self, action: impl Into<String>) -> Self {
        self.can_do = Some(action.into());
        self
    }

    pub fn perm_required(mut self) -> Self {
        self.perm_required = true;
        self
    }
}

/// Everything an entry point knows about the current call. Built once by
/// [`prepare`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub params: ParsedParams,
    pub project: Option<Project>,
    /// Outcome of the `can_do` check. Falls back to the entry point's
    /// `public` flag when no action was named.
    pub permitted: bool,
    pub ip: Option<String>,
    pub bearer: Option<String>,
}

impl RequestContext {
    pub fn principal(&self) -> Result<&Principal, AccountError> {
        self.principal.as_ref().ok_or(AccountError::Unauthenticated)
    }

    /// Objects owned by someone else read as missing unless the caller holds
    /// the checked permission.
    pub fn ensure_visible(&self, owner_id: Uuid, what: &str) -> Result<(), AccountError> {
        let owns = self
            .principal
            .as_ref()
            .map(|p| p.id == owner_id)
            .unwrap_or(false);
        if owns || self.permitted {
            Ok(())
        } else {
            Err(AccountError::NotFound(what.to_string()))
        }
    }
}

fn project_id(data: &serde_json::Map<String, Value>) -> Option<String> {
    match data.get("project_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn resolve_project(
    state: &AppState,
    data: &serde_json::Map<String, Value>,
    required: bool,
) -> Result<Option<Project>, AccountError> {
    let Some(id) = project_id(data) else {
        if required {
            return Err(AccountError::NotFound("Project".to_string()));
        }
        return Ok(None);
    };

    let project = state.scopes.project_resolver()?.find_project(&id).await?;
    if project.is_none() && required {
        return Err(AccountError::NotFound("Project".to_string()));
    }
    Ok(project)
}

/// Run the gate for one call.
#[tracing::instrument(skip_all, fields(public = options.public, can_do = ?options.can_do))]
pub async fn prepare(
    state: &AppState,
    req: &RawRequest,
    options: &HandlerOptions,
) -> Result<RequestContext, AccountError> {
    let bearer = req.bearer_token().map(str::to_string);
    let principal = match bearer.as_deref() {
        Some(token) => state.tokens.resolve_bearer(token).await?,
        None => None,
    };

    if !options.public && principal.is_none() {
        return Err(AccountError::Unauthenticated);
    }

    let data = extract_data(req)?;
    let project = resolve_project(state, &data, options.project_required).await?;

    let ctx = ParseContext {
        tz: state
            .config
            .host_timezone()
            .unwrap_or_else(|| Utc.fix()),
        project: project.as_ref(),
    };
    let params = parse_params(&data, &req.files, &options.params, &ctx)?;

    let permitted = match (&options.can_do, &principal) {
        (Some(action), Some(principal)) => {
            state
                .rbac
                .check_perm(principal, action, project.as_ref())
                .await?
        }
        (Some(_), None) => false,
        (None, _) => options.public,
    };
    if options.can_do.is_some() && options.perm_required && !permitted {
        return Err(AccountError::PermissionDenied);
    }

    Ok(RequestContext {
        principal,
        params,
        project,
        permitted,
        ip: client_ip(req),
        bearer,
    })
}
