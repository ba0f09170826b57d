use chrono::FixedOffset;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Fields a request may never write onto a principal, whatever the key map says.
pub const PROHIBITED_FIELDS: &[&str] = &[
    "id",
    "password",
    "is_superuser",
    "is_staff",
    "is_active",
    "verified",
    "email_verified",
    "last_login",
    "date_joined",
    "updated_fields",
    "groups",
    "user_permissions",
];

#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    /// Request key carrying the login identity.
    pub username_field: String,
    pub verification: VerificationConfig,
    pub tokens: TokenConfig,
    pub rbac: RbacConfig,
    pub host_utc_offset_minutes: i32,
    pub redis: Option<RedisConfig>,
    pub secure_cache_secret: String,
    pub email: EmailConfig,
    pub push: FcmConfig,
    pub profile: ProfileConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationConfig {
    pub expire_seconds: i64,
    pub cache_key_prefix: String,
    /// Exact addresses or `prefix*` patterns.
    pub tester_emails: Vec<String>,
    pub tester_code: String,
    pub debug_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenConfig {
    pub access_token_expire_seconds: i64,
    /// Client application registered at startup when missing.
    pub seed_client: Option<ClientSeed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSeed {
    pub client_id: String,
    pub client_secret: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RbacConfig {
    pub auto_register_permissions: bool,
    pub project_scope_kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub enabled: bool,
    /// Send mail even when running in debug mode.
    pub debug_enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub from_email: String,
    pub exclude_domains: Vec<String>,
    pub footer_enabled: bool,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FcmConfig {
    pub enabled: bool,
    pub project_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileConfig {
    /// Extra prohibited fields on top of [`PROHIBITED_FIELDS`].
    pub prohibited_fields: Vec<String>,
    /// Host attributes a principal profile may carry.
    pub profile_fields: Vec<String>,
}

impl ProfileConfig {
    pub fn is_prohibited(&self, field: &str) -> bool {
        field.starts_with("doc_")
            || PROHIBITED_FIELDS.contains(&field)
            || self.prohibited_fields.iter().any(|f| f == field)
    }

    pub fn is_writable(&self, field: &str) -> bool {
        !self.is_prohibited(field)
            && (field == "email"
                || field == "username"
                || self.profile_fields.iter().any(|f| f == field))
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            username_field: "email".to_string(),
            verification: VerificationConfig {
                expire_seconds: 900,
                cache_key_prefix: "NC_T".to_string(),
                tester_emails: Vec::new(),
                tester_code: "123456".to_string(),
                debug_code: "123456".to_string(),
            },
            tokens: TokenConfig {
                access_token_expire_seconds: 2_592_000,
                seed_client: None,
            },
            rbac: RbacConfig {
                auto_register_permissions: true,
                project_scope_kind: None,
            },
            host_utc_offset_minutes: 0,
            redis: None,
            secure_cache_secret: String::new(),
            email: EmailConfig {
                enabled: false,
                debug_enabled: false,
                smtp_host: "localhost".to_string(),
                smtp_port: 587,
                smtp_user: String::new(),
                smtp_password: String::new(),
                from_email: "no-reply@localhost".to_string(),
                exclude_domains: Vec::new(),
                footer_enabled: false,
                footer: String::new(),
            },
            push: FcmConfig {
                enabled: false,
                project_id: String::new(),
                access_token: String::new(),
            },
            profile: ProfileConfig {
                prohibited_fields: Vec::new(),
                profile_fields: default_profile_fields(),
            },
        }
    }
}

fn default_profile_fields() -> Vec<String> {
    ["first_name", "last_name", "phone", "avatar", "language"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AccountConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let email_enabled = parse_env("EMAIL_ENABLED", "false")?;
        let fcm_enabled = parse_env("FCM_ENABLED", "false")?;

        let config = AccountConfig {
            common: common_config,
            environment,
            username_field: get_env("USERNAME_FIELD", Some("email"), false)?,
            verification: VerificationConfig {
                expire_seconds: parse_env("VERIFICATION_CODE_EXPIRE_SECONDS", "900")?,
                cache_key_prefix: get_env("VERIFICATION_CODE_CACHE_KEY", Some("NC_T"), false)?,
                tester_emails: split_list(&get_env("VERIFICATION_TESTER_EMAILS", Some(""), false)?),
                tester_code: get_env("VERIFICATION_TESTER_CODE", Some("123456"), false)?,
                debug_code: get_env("VERIFICATION_DEBUG_CODE", Some("123456"), false)?,
            },
            tokens: TokenConfig {
                access_token_expire_seconds: parse_env("ACCESS_TOKEN_EXPIRE_SECONDS", "2592000")?,
                seed_client: seed_client_from_env()?,
            },
            rbac: RbacConfig {
                auto_register_permissions: parse_env("RBAC_AUTO_REGISTER_PERMISSIONS", "true")?,
                project_scope_kind: env::var("PROJECT_SCOPE_KIND")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
            },
            host_utc_offset_minutes: parse_env("HOST_UTC_OFFSET_MINUTES", "0")?,
            redis: env::var("REDIS_URL")
                .ok()
                .filter(|url| !url.is_empty())
                .map(|url| RedisConfig { url }),
            secure_cache_secret: get_env("SECURE_CACHE_SECRET", Some(""), is_prod)?,
            email: EmailConfig {
                enabled: email_enabled,
                debug_enabled: parse_env("EMAIL_DEBUG_ENABLED", "false")?,
                smtp_host: get_env("SMTP_HOST", Some("localhost"), is_prod && email_enabled)?,
                smtp_port: parse_env("SMTP_PORT", "587")?,
                smtp_user: get_env("SMTP_USER", Some(""), is_prod && email_enabled)?,
                smtp_password: get_env("SMTP_PASSWORD", Some(""), is_prod && email_enabled)?,
                from_email: get_env("EMAIL_FROM", Some("no-reply@localhost"), is_prod && email_enabled)?,
                exclude_domains: split_list(&get_env("EMAIL_EXCLUDE_DOMAINS", Some(""), false)?)
                    .into_iter()
                    .map(|d| d.to_lowercase())
                    .collect(),
                footer_enabled: parse_env("EMAIL_FOOTER_ENABLED", "false")?,
                footer: get_env("EMAIL_FOOTER", Some(""), false)?,
            },
            push: FcmConfig {
                enabled: fcm_enabled,
                project_id: get_env("FCM_PROJECT_ID", Some(""), is_prod && fcm_enabled)?,
                access_token: get_env("FCM_ACCESS_TOKEN", Some(""), is_prod && fcm_enabled)?,
            },
            profile: ProfileConfig {
                prohibited_fields: split_list(&get_env("USER_PROHIBITED_FIELDS", Some(""), false)?),
                profile_fields: match env::var("USER_PROFILE_FIELDS") {
                    Ok(list) => split_list(&list),
                    Err(_) => default_profile_fields(),
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.verification.expire_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "VERIFICATION_CODE_EXPIRE_SECONDS must be positive"
            )));
        }

        if self.tokens.access_token_expire_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_EXPIRE_SECONDS must be positive"
            )));
        }

        if let Some(seed) = &self.tokens.seed_client {
            if seed.client_secret.is_empty() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "OAUTH_CLIENT_SECRET must not be empty"
                )));
            }
        }

        if self.host_timezone().is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HOST_UTC_OFFSET_MINUTES is out of range"
            )));
        }

        if self.environment == Environment::Prod {
            if self.secure_cache_secret.is_empty() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SECURE_CACHE_SECRET is required in production"
                )));
            }

            if !self.verification.tester_emails.is_empty() {
                tracing::warn!(
                    testers = self.verification.tester_emails.len(),
                    "Tester verification codes are enabled in production"
                );
            }
        }

        Ok(())
    }

    /// Debug mode swaps generated codes for the fixed debug code and mutes email.
    pub fn is_debug(&self) -> bool {
        self.environment == Environment::Dev
    }

    pub fn host_timezone(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.host_utc_offset_minutes * 60)
    }

    /// Cache slot holding the plaintext code for a principal.
    pub fn code_cache_key(&self, principal_id: &uuid::Uuid) -> String {
        format!("{}{}", self.verification.cache_key_prefix, principal_id)
    }
}

/// `OAUTH_CLIENT_ID` enables the seed; its secret is then mandatory.
fn seed_client_from_env() -> Result<Option<ClientSeed>, AppError> {
    let client_id = get_env("OAUTH_CLIENT_ID", Some(""), false)?;
    if client_id.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(ClientSeed {
        client_secret: get_env("OAUTH_CLIENT_SECRET", None, false)?,
        name: get_env("OAUTH_CLIENT_NAME", Some(&client_id), false)?,
        client_id,
    }))
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
