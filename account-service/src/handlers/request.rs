//! Transport-neutral view of an inbound request.

use axum::http::{header, HeaderMap, Method};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::params::UploadedFile;
use crate::services::error::ParamError;
use crate::utils::bearer_from_header;

/// Headers consulted for the client address, most trusted first.
const IP_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "client-ip",
    "x-real-ip",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
    "via",
];

#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub content_type: Option<String>,
    pub query: String,
    pub body: Vec<u8>,
    /// Multipart uploads, already split out by the host.
    pub files: HashMap<String, UploadedFile>,
    pub headers: HeaderMap,
    pub remote_addr: Option<String>,
}

impl RawRequest {
    pub fn get(query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            content_type: None,
            query: query.into(),
            body: Vec::new(),
            files: HashMap::new(),
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    /// POST with a JSON body.
    pub fn json(body: &Value) -> Self {
        Self {
            method: Method::POST,
            content_type: Some("application/json".to_string()),
            query: String::new(),
            body: body.to_string().into_bytes(),
            files: HashMap::new(),
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    /// POST with an urlencoded form body.
    pub fn form(body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            content_type: Some("application/x-www-form-urlencoded".to_string()),
            query: String::new(),
            body: body.into().into_bytes(),
            files: HashMap::new(),
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        if let Ok(value) = format!("Bearer {}", token).parse() {
            self.headers.insert(header::AUTHORIZATION, value);
        }
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_file(mut self, key: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(key.into(), file);
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_from_header)
    }

    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }
}

/// Raw key/value data of the request: the query string for GET, otherwise
/// the JSON or urlencoded body.
pub fn extract_data(req: &RawRequest) -> Result<Map<String, Value>, ParamError> {
    if req.method == Method::GET {
        return decode_urlencoded(req.query.as_bytes());
    }

    if req.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    if req.is_json() {
        return match serde_json::from_slice::<Value>(&req.body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ParamError::MalformedBody(
                "expected a JSON object".to_string(),
            )),
            Err(e) => Err(ParamError::MalformedBody(e.to_string())),
        };
    }

    decode_urlencoded(&req.body)
}

fn decode_urlencoded(input: &[u8]) -> Result<Map<String, Value>, ParamError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)
        .map_err(|e| ParamError::MalformedBody(e.to_string()))?;

    // Repeated keys keep the last value
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

/// Best-effort client address from proxy headers, then the socket peer.
pub fn client_ip(req: &RawRequest) -> Option<String> {
    IP_HEADERS
        .iter()
        .filter_map(|name| req.headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(|value| value.trim())
        .find(|value| !value.is_empty() && !value.eq_ignore_ascii_case("unknown"))
        .map(str::to_string)
        .or_else(|| req.remote_addr.clone())
}
