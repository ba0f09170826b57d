use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{ProviderError, ProviderResponse, PushMessage, PushProvider};
use crate::config::FcmConfig;

const FCM_API_URL: &str = "https://fcm.googleapis.com/v1/projects";

pub struct FcmProvider {
    config: FcmConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct FcmRequest {
    message: FcmMessage,
}

#[derive(Debug, Serialize)]
struct FcmMessage {
    token: String,
    notification: FcmNotification,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    data: HashMap<String, String>,
    android: FcmAndroidConfig,
    apns: FcmApnsConfig,
}

#[derive(Debug, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct FcmAndroidConfig {
    priority: String,
    notification: FcmAndroidNotification,
}

#[derive(Debug, Serialize)]
struct FcmAndroidNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<String>,
    icon: String,
    sound: String,
}

#[derive(Debug, Serialize)]
struct FcmApnsConfig {
    headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorResponse {
    error: FcmError,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct FcmError {
    code: i32,
    message: String,
    status: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl FcmError {
    fn is_unregistered(&self) -> bool {
        self.status == "NOT_FOUND"
            || self
                .details
                .iter()
                .any(|d| d.get("errorCode").and_then(|c| c.as_str()) == Some("UNREGISTERED"))
    }
}

impl FcmProvider {
    pub fn new(config: FcmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn access_token(&self) -> Result<&str, ProviderError> {
        if self.config.access_token.is_empty() {
            return Err(ProviderError::Authentication(
                "FCM access token not configured".to_string(),
            ));
        }
        Ok(&self.config.access_token)
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send(&self, push: &PushMessage) -> Result<ProviderResponse, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::NotEnabled(
                "FCM push provider is not enabled".to_string(),
            ));
        }

        if self.config.project_id.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }

        let access_token = self.access_token()?;

        let mut apns_headers = HashMap::new();
        apns_headers.insert("apns-priority".to_string(), "10".to_string());

        let request = FcmRequest {
            message: FcmMessage {
                token: push.device_token.clone(),
                notification: FcmNotification {
                    title: push.title.clone(),
                    body: push.body.clone(),
                },
                data: push.data.clone(),
                android: FcmAndroidConfig {
                    priority: "high".to_string(),
                    notification: FcmAndroidNotification {
                        channel_id: push.channel_id.clone(),
                        icon: "ic_notification".to_string(),
                        sound: "default".to_string(),
                    },
                },
                apns: FcmApnsConfig {
                    headers: apns_headers,
                },
            },
        };

        let url = format!("{}/{}/messages:send", FCM_API_URL, self.config.project_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to connect to FCM: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = serde_json::from_str::<FcmErrorResponse>(&body).ok();

            if status == StatusCode::NOT_FOUND
                || error.as_ref().map(|e| e.error.is_unregistered()).unwrap_or(false)
            {
                return Err(ProviderError::Unregistered(push.device_token.clone()));
            }

            return Err(ProviderError::SendFailed(format!(
                "FCM API returned error status {}: {}",
                status,
                error.map(|e| e.error.message).unwrap_or(body)
            )));
        }

        let fcm_response: FcmResponse = response.json().await.map_err(|e| {
            ProviderError::SendFailed(format!("Failed to parse FCM response: {}", e))
        })?;

        tracing::info!(title = %push.title, "Push notification sent via FCM");

        Ok(ProviderResponse::success(fcm_response.name))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if !self.config.enabled {
            return Ok(());
        }

        if self.config.project_id.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }

        self.access_token().map(|_| ())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Mock push provider for testing. Tokens marked unregistered fail the way
/// FCM reports a stale registration.
pub struct MockPushProvider {
    enabled: bool,
    send_count: AtomicU64,
    unregistered: Mutex<HashSet<String>>,
    sent: Mutex<Vec<PushMessage>>,
}

impl MockPushProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            send_count: AtomicU64::new(0),
            unregistered: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn mark_unregistered(&self, token: &str) {
        if let Ok(mut tokens) = self.unregistered.lock() {
            tokens.insert(token.to_string());
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(&self, push: &PushMessage) -> Result<ProviderResponse, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotEnabled(
                "Mock push provider is not enabled".to_string(),
            ));
        }

        let unregistered = self
            .unregistered
            .lock()
            .map_err(|e| ProviderError::SendFailed(format!("Mock push state poisoned: {}", e)))?
            .contains(&push.device_token);
        if unregistered {
            return Err(ProviderError::Unregistered(push.device_token.clone()));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .map_err(|e| ProviderError::SendFailed(format!("Mock push state poisoned: {}", e)))?
            .push(push.clone());

        tracing::info!(title = %push.title, "[MOCK] Push notification would be sent");

        Ok(ProviderResponse::success(Some(format!("mock-push-{}", count))))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unregistered_detection() {
        let body = json!({
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND",
                "details": [{ "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError", "errorCode": "UNREGISTERED" }]
            }
        });
        let parsed: FcmErrorResponse = serde_json::from_value(body).unwrap();
        assert!(parsed.error.is_unregistered());

        let body = json!({
            "error": { "code": 400, "message": "bad", "status": "INVALID_ARGUMENT" }
        });
        let parsed: FcmErrorResponse = serde_json::from_value(body).unwrap();
        assert!(!parsed.error.is_unregistered());
    }

    #[tokio::test]
    async fn test_mock_reports_unregistered_tokens() {
        let provider = MockPushProvider::new(true);
        provider.mark_unregistered("stale");

        let mut message = PushMessage {
            device_token: "stale".into(),
            title: "t".into(),
            body: "b".into(),
            data: HashMap::new(),
            channel_id: None,
        };
        assert!(matches!(
            provider.send(&message).await,
            Err(ProviderError::Unregistered(_))
        ));

        message.device_token = "fresh".into();
        assert!(provider.send(&message).await.is_ok());
        assert_eq!(provider.send_count(), 1);
    }

    #[tokio::test]
    async fn test_fcm_disabled() {
        let provider = FcmProvider::new(FcmConfig {
            enabled: false,
            project_id: String::new(),
            access_token: String::new(),
        });
        assert!(!provider.is_enabled());
        assert!(provider.health_check().await.is_ok());
    }
}
