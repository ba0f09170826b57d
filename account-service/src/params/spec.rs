//! Declarative request parameter descriptors.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::coerce;
use crate::models::Project;
use crate::services::error::ParamError;
use crate::utils::mime::guess_mime;

/// Caller-supplied coercion for [`ParamKind::Custom`].
pub type Coercer = Arc<dyn Fn(&Value) -> Result<ParamValue, anyhow::Error> + Send + Sync>;

/// Extra check run on a coerced value, with the request project when one is attached.
pub type Validator = Arc<dyn Fn(&ParamValue, Option<&Project>) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum ParamKind {
    Int,
    Str,
    Bool,
    Float,
    Date,
    DateTime,
    Email,
    File,
    List,
    Dict,
    Custom { name: String, coerce: Coercer },
}

impl ParamKind {
    pub fn custom<F>(name: impl Into<String>, coerce: F) -> Self
    where
        F: Fn(&Value) -> Result<ParamValue, anyhow::Error> + Send + Sync + 'static,
    {
        ParamKind::Custom {
            name: name.into(),
            coerce: Arc::new(coerce),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Str => "str",
            ParamKind::Bool => "bool",
            ParamKind::Float => "float",
            ParamKind::Date => "date",
            ParamKind::DateTime => "datetime",
            ParamKind::Email => "email",
            ParamKind::File => "file",
            ParamKind::List => "list",
            ParamKind::Dict => "dict",
            ParamKind::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Uploaded file as handed over by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A coerced parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    List(Vec<Value>),
    Json(Value),
    File(UploadedFile),
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            ParamValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            ParamValue::List(items) => Some(items),
            ParamValue::Json(Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            ParamValue::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            ParamValue::File(file) => Some(file),
            _ => None,
        }
    }

    /// JSON rendering. Files render as their name.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            ParamValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            ParamValue::List(items) => Value::Array(items.clone()),
            ParamValue::Json(v) => v.clone(),
            ParamValue::File(file) => Value::String(file.name.clone()),
        }
    }
}

/// Per-request context handed to coercion and validation.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub tz: FixedOffset,
    pub project: Option<&'a Project>,
}

impl Default for ParseContext<'_> {
    fn default() -> Self {
        Self {
            tz: Utc.fix(),
            project: None,
        }
    }
}

#[derive(Clone)]
pub struct ParamSpec {
    pub key: String,
    pub kind: ParamKind,
    pub optional: bool,
    pub default: ParamValue,
    /// Accepted MIME types for file parameters. Empty accepts anything.
    pub filetypes: Vec<String>,
    pub validate: Option<Validator>,
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("default", &self.default)
            .field("filetypes", &self.filetypes)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

impl ParamSpec {
    pub fn required(key: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            key: key.into(),
            kind,
            optional: false,
            default: ParamValue::Null,
            filetypes: Vec::new(),
            validate: None,
        }
    }

    pub fn optional(key: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            optional: true,
            ..Self::required(key, kind)
        }
    }

    pub fn with_default(mut self, default: ParamValue) -> Self {
        self.optional = true;
        self.default = default;
        self
    }

    pub fn with_filetypes<I, S>(mut self, filetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filetypes = filetypes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&ParamValue, Option<&Project>) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ParamKind::File)
    }

    /// Resolve this parameter from raw request data.
    pub fn get_value(
        &self,
        data: &Map<String, Value>,
        ctx: &ParseContext<'_>,
    ) -> Result<ParamValue, ParamError> {
        let raw = data.get(&self.key);

        if matches!(self.kind, ParamKind::Bool) {
            return Ok(ParamValue::Bool(raw.map(coerce::is_true_marker).unwrap_or(false)));
        }

        let raw = match raw {
            Some(v) if coerce::is_zero(v) => return Ok(ParamValue::Int(0)),
            Some(v) if !coerce::is_blank(v) => v,
            _ => return self.missing(),
        };

        // UI select widgets post {"value": ..., "label": ...}
        let raw = match (raw, &self.kind) {
            (Value::Object(map), kind) if !matches!(kind, ParamKind::Dict) && map.contains_key("value") => {
                match map.get("value") {
                    Some(Value::Null) | None => return self.missing(),
                    Some(inner) => inner,
                }
            }
            _ => raw,
        };

        let value = self.coerce(raw, ctx)?;

        if let Some(validate) = &self.validate {
            if !validate(&value, ctx.project) {
                return Err(self.invalid(raw));
            }
        }

        Ok(value)
    }

    /// Resolve this parameter from the uploaded file map.
    pub fn get_file(&self, files: &HashMap<String, UploadedFile>) -> Result<ParamValue, ParamError> {
        let Some(file) = files.get(&self.key) else {
            return self.missing();
        };

        if !self.filetypes.is_empty() {
            let mime = guess_mime(&file.name);
            let accepted = mime
                .map(|m| self.filetypes.iter().any(|t| t == m))
                .unwrap_or(false);
            if !accepted {
                return Err(ParamError::InvalidType {
                    key: self.key.clone(),
                    mime: mime.map(str::to_string),
                });
            }
        }

        Ok(ParamValue::File(file.clone()))
    }

    fn missing(&self) -> Result<ParamValue, ParamError> {
        if self.optional {
            Ok(self.default.clone())
        } else {
            Err(ParamError::RequiredParameter(self.key.clone()))
        }
    }

    fn invalid(&self, raw: &Value) -> ParamError {
        ParamError::InvalidValue {
            key: self.key.clone(),
            value: coerce::display_raw(raw),
            kind: self.kind.name().to_string(),
        }
    }

    fn coerce(&self, raw: &Value, ctx: &ParseContext<'_>) -> Result<ParamValue, ParamError> {
        let coerced = match &self.kind {
            ParamKind::Int => coerce::to_int(raw),
            ParamKind::Str => coerce::to_str(raw),
            ParamKind::Float => coerce::to_float(raw),
            ParamKind::Date => coerce::to_date(raw, ctx.tz),
            ParamKind::DateTime => coerce::to_datetime(raw, ctx.tz),
            ParamKind::Email => coerce::to_email(raw),
            ParamKind::List => coerce::to_list(raw),
            ParamKind::Dict => coerce::to_dict(raw),
            ParamKind::Custom { coerce: f, .. } => f(raw).ok(),
            // Files come from the upload map, never from body data
            ParamKind::File | ParamKind::Bool => None,
        };
        coerced.ok_or_else(|| self.invalid(raw))
    }
}
