use service_core::error::AppError;
use thiserror::Error;

/// Request parameter failures. Messages carry the client-facing codes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("RP_REQUIRED_PARAMETER: {0}")]
    RequiredParameter(String),

    #[error("RP_INVALID_VALUE: {key}={value} is not a valid {kind}")]
    InvalidValue {
        key: String,
        value: String,
        kind: String,
    },

    #[error("RP_INVALID_DATA_TYPE: {}{}", .key, mime_suffix(.mime))]
    InvalidType { key: String, mime: Option<String> },

    #[error("RP_MISSING_PARAMETERS: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("RP_MALFORMED_BODY: {0}")]
    MalformedBody(String),
}

fn mime_suffix(mime: &Option<String>) -> String {
    mime.as_ref().map(|m| format!(" ({})", m)).unwrap_or_default()
}

impl ParamError {
    pub fn code(&self) -> &'static str {
        match self {
            ParamError::RequiredParameter(_) => "RP_REQUIRED_PARAMETER",
            ParamError::InvalidValue { .. } => "RP_INVALID_VALUE",
            ParamError::InvalidType { .. } => "RP_INVALID_DATA_TYPE",
            ParamError::MissingParameters(_) => "RP_MISSING_PARAMETERS",
            ParamError::MalformedBody(_) => "RP_MALFORMED_BODY",
        }
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid client")]
    InvalidClient,

    #[error("Invalid client secret")]
    InvalidSecret,

    #[error("No verification code requested")]
    NoCodeRequested,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl AccountError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AccountError::Param(e) => e.code(),
            AccountError::Unauthenticated => "unauthenticated",
            AccountError::PermissionDenied => "permission_denied",
            AccountError::NotFound(_) => "not_found",
            AccountError::BadRequest(_) => "bad_request",
            AccountError::InvalidClient => "invalid_client",
            AccountError::InvalidSecret => "invalid_secret",
            AccountError::NoCodeRequested => "no_code_requested",
            AccountError::InvalidCode => "invalid_code",
            AccountError::Configuration(_) => "configuration",
            AccountError::Storage(_) => "storage",
            AccountError::Cache(_) => "cache",
            AccountError::Internal(_) => "internal",
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Param(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            AccountError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            AccountError::PermissionDenied => AppError::Forbidden(anyhow::anyhow!("not authorized")),
            AccountError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            AccountError::BadRequest(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            // Issuance failures share one client-facing message
            AccountError::InvalidClient
            | AccountError::InvalidSecret
            | AccountError::NoCodeRequested
            | AccountError::InvalidCode => {
                AppError::AuthError(anyhow::anyhow!("authentication failed"))
            }
            AccountError::Configuration(e) => AppError::ConfigError(anyhow::anyhow!(e)),
            AccountError::Storage(e) => AppError::DatabaseError(e),
            AccountError::Cache(e) => AppError::CacheError(e),
            AccountError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_param_error_messages() {
        let err = ParamError::MissingParameters(vec!["username".into(), "code".into()]);
        assert_eq!(err.to_string(), "RP_MISSING_PARAMETERS: username, code");

        let err = ParamError::InvalidType {
            key: "avatar".into(),
            mime: Some("text/plain".into()),
        };
        assert_eq!(err.to_string(), "RP_INVALID_DATA_TYPE: avatar (text/plain)");
    }

    #[test]
    fn test_issuance_failures_share_one_message() {
        for err in [
            AccountError::InvalidClient,
            AccountError::InvalidSecret,
            AccountError::NoCodeRequested,
            AccountError::InvalidCode,
        ] {
            let app: AppError = err.into();
            assert_eq!(app.to_string(), "Authentication error: authentication failed");
        }
    }

    #[test]
    fn test_account_error_status_mapping() {
        let cases = vec![
            (AccountError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AccountError::PermissionDenied, StatusCode::FORBIDDEN),
            (AccountError::NotFound("object".into()), StatusCode::NOT_FOUND),
            (AccountError::InvalidCode, StatusCode::UNAUTHORIZED),
            (
                AccountError::Param(ParamError::RequiredParameter("code".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AccountError::Configuration("missing resolver".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status_code(), status);
        }
    }
}
