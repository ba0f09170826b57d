use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages;
use super::{EmailBody, NotificationDispatcher};
use crate::config::AccountConfig;
use crate::services::cache::CacheStore;
use crate::services::error::AccountError;
use crate::services::store::AccountStore;

/// Security events that trigger notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    VerificationCodeIssued { principal_id: Uuid, code_id: Uuid },
    NewLogin { principal_id: Uuid, code_id: Uuid },
}

/// Fire-and-forget handle onto the notification worker.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<AccountEvent>,
}

impl NotificationQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AccountEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Never blocks and never fails the caller.
    pub fn emit(&self, event: AccountEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(event = ?e.0, "Notification worker is gone, dropping event");
        }
    }
}

pub struct NotificationWorker {
    store: Arc<dyn AccountStore>,
    cache: Arc<dyn CacheStore>,
    dispatcher: Arc<NotificationDispatcher>,
    config: AccountConfig,
}

impl NotificationWorker {
    pub fn new(
        store: Arc<dyn AccountStore>,
        cache: Arc<dyn CacheStore>,
        dispatcher: Arc<NotificationDispatcher>,
        config: AccountConfig,
    ) -> Self {
        Self {
            store,
            cache,
            dispatcher,
            config,
        }
    }

    pub fn spawn(self, mut receiver: mpsc::UnboundedReceiver<AccountEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = self.handle(&event).await {
                    tracing::error!(event = ?event, error = %e, kind = e.kind(), "Notification handling failed");
                }
            }
            tracing::info!("Notification worker stopped");
        })
    }

    /// Handle everything currently queued, then return. Used by tests and
    /// hosts that drive delivery themselves.
    pub async fn drain(&self, receiver: &mut mpsc::UnboundedReceiver<AccountEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = receiver.try_recv() {
            if let Err(e) = self.handle(&event).await {
                tracing::error!(event = ?event, error = %e, "Notification handling failed");
            }
            handled += 1;
        }
        handled
    }

    pub async fn handle(&self, event: &AccountEvent) -> Result<(), AccountError> {
        match event {
            AccountEvent::VerificationCodeIssued { principal_id, .. } => {
                self.send_verification_code(*principal_id).await
            }
            AccountEvent::NewLogin {
                principal_id,
                code_id,
            } => self.send_new_login(*principal_id, *code_id).await,
        }
    }

    async fn send_verification_code(&self, principal_id: Uuid) -> Result<(), AccountError> {
        let Some(principal) = self.store.find_principal(principal_id).await? else {
            tracing::warn!(%principal_id, "Principal gone before code email");
            return Ok(());
        };

        let key = self.config.code_cache_key(&principal.id);
        let Some(code) = self.cache.get(&key).await.map_err(AccountError::Cache)? else {
            tracing::warn!(%principal_id, "Verification code no longer cached, skipping email");
            return Ok(());
        };

        let body = if self.dispatcher.has_renderer() {
            EmailBody::Template(messages::VERIFICATION_CODE_TEMPLATE.to_string())
        } else {
            EmailBody::Html(messages::verification_code_html(&principal.username, &code))
        };
        let context = json!({ "code": code, "username": principal.username });

        let outcome = self
            .dispatcher
            .send_email(
                messages::VERIFICATION_CODE_SUBJECT,
                &[principal.email.clone()],
                body,
                &context,
                false,
            )
            .await;
        tracing::info!(%principal_id, ok = outcome.ok, reason = ?outcome.reason_code, "Verification code email handled");
        Ok(())
    }

    async fn send_new_login(&self, principal_id: Uuid, code_id: Uuid) -> Result<(), AccountError> {
        let Some(principal) = self.store.find_principal(principal_id).await? else {
            tracing::warn!(%principal_id, "Principal gone before login notice");
            return Ok(());
        };

        let code = self.store.find_code(code_id).await?;
        let ip = code
            .as_ref()
            .and_then(|c| c.ip.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let device = match code.as_ref().and_then(|c| c.device_id) {
            Some(device_id) => self.store.find_device(device_id).await?,
            None => None,
        };
        let device_name = device
            .as_ref()
            .map(|d| d.display_name())
            .unwrap_or_else(|| "unknown device".to_string());
        let device_uuid = device.as_ref().map(|d| d.uuid.to_string()).unwrap_or_default();

        let body = if self.dispatcher.has_renderer() {
            EmailBody::Template(messages::NEW_LOGIN_TEMPLATE.to_string())
        } else {
            EmailBody::Html(messages::new_login_html(&principal.username, &ip, &device_name))
        };
        let context = json!({
            "username": principal.username,
            "ip": ip,
            "device": device_name,
        });
        let outcome = self
            .dispatcher
            .send_email(
                messages::NEW_LOGIN_SUBJECT,
                &[principal.email.clone()],
                body,
                &context,
                false,
            )
            .await;
        tracing::info!(%principal_id, ok = outcome.ok, reason = ?outcome.reason_code, "New login email handled");

        let (title, body, data) =
            messages::new_login_push(&principal.username, &ip, &device_name, &device_uuid);
        let results = self
            .dispatcher
            .send_push(&principal, &title, &body, data, Some("security"))
            .await;
        tracing::info!(%principal_id, devices = results.len(), "New login push handled");

        Ok(())
    }
}
