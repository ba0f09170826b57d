use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::messages::with_footer;
use super::{EmailMessage, EmailProvider, ProviderError, PushMessage, PushProvider};
use crate::config::EmailConfig;
use crate::models::{EmailOutcome, Principal, PushNotificationRecord};
use crate::services::metrics;
use crate::services::store::AccountStore;

/// Host-supplied template engine.
pub trait TemplateRenderer: Send + Sync {
    /// `Ok(None)` when no template with that name exists.
    fn render(&self, template: &str, context: &Value) -> Result<Option<String>, anyhow::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmailBody {
    Html(String),
    Template(String),
}

/// Sends email and push notifications. Failures are logged and reported in
/// the returned outcome, never raised.
pub struct NotificationDispatcher {
    email: Arc<dyn EmailProvider>,
    push: Arc<dyn PushProvider>,
    store: Arc<dyn AccountStore>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    settings: EmailConfig,
    debug: bool,
}

impl NotificationDispatcher {
    pub fn new(
        email: Arc<dyn EmailProvider>,
        push: Arc<dyn PushProvider>,
        store: Arc<dyn AccountStore>,
        settings: EmailConfig,
        debug: bool,
    ) -> Self {
        Self {
            email,
            push,
            store,
            renderer: None,
            settings,
            debug,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    fn is_excluded(&self, address: &str) -> bool {
        let domain = address
            .rsplit_once('@')
            .map(|(_, d)| d.to_lowercase())
            .unwrap_or_default();
        self.settings.exclude_domains.iter().any(|d| *d == domain)
    }

    #[tracing::instrument(skip(self, recipients, body, context), fields(recipients = recipients.len()))]
    pub async fn send_email(
        &self,
        subject: &str,
        recipients: &[String],
        body: EmailBody,
        context: &Value,
        force: bool,
    ) -> EmailOutcome {
        if self.debug && !self.settings.debug_enabled && !force {
            tracing::debug!("Email disabled in debug mode");
            return EmailOutcome::skipped("debug_disabled", "email is disabled in debug mode");
        }

        if !self.email.is_enabled() {
            return EmailOutcome::skipped("email_disabled", "email provider is not enabled");
        }

        let recipients: Vec<String> = recipients
            .iter()
            .filter(|r| !r.is_empty() && !self.is_excluded(r))
            .cloned()
            .collect();
        if recipients.is_empty() {
            return EmailOutcome::skipped("no_recipients", "no recipients left after filtering");
        }

        let html = match body {
            EmailBody::Html(html) => html,
            EmailBody::Template(name) => {
                let Some(renderer) = &self.renderer else {
                    return EmailOutcome::skipped("template_missing", format!("no renderer for {}", name));
                };
                match renderer.render(&name, context) {
                    Ok(Some(html)) => html,
                    Ok(None) => {
                        return EmailOutcome::skipped("template_missing", format!("template {} not found", name));
                    }
                    Err(e) => {
                        tracing::error!(template = %name, error = %e, "Failed to render email template");
                        return EmailOutcome::skipped("template_error", e.to_string());
                    }
                }
            }
        };

        let html = if self.settings.footer_enabled && !self.settings.footer.is_empty() {
            with_footer(&html, &self.settings.footer)
        } else {
            html
        };

        let message = EmailMessage {
            to: recipients,
            subject: subject.to_string(),
            body_text: None,
            body_html: Some(html),
        };

        match self.email.send(&message).await {
            Ok(response) => {
                metrics::record_notification("email", "sent");
                EmailOutcome::sent(response.provider_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send email");
                metrics::record_notification("email", "failed");
                EmailOutcome::skipped("send_failed", e.to_string())
            }
        }
    }

    /// Push to every logged-in device of `principal` that has a push token.
    /// Returns one record per targeted device, keyed by device id.
    #[tracing::instrument(skip(self, principal, body, data), fields(principal_id = %principal.id))]
    pub async fn send_push(
        &self,
        principal: &Principal,
        title: &str,
        body: &str,
        data: HashMap<String, String>,
        channel: Option<&str>,
    ) -> HashMap<Uuid, PushNotificationRecord> {
        let mut results = HashMap::new();

        if !self.push.is_enabled() {
            tracing::debug!("Push provider disabled");
            return results;
        }

        let devices = match self.store.list_devices(principal.id).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list devices for push");
                return results;
            }
        };

        let targets: Vec<_> = devices
            .into_iter()
            .filter(|d| d.last_login.is_some())
            .filter_map(|d| d.push_token.clone().map(|token| (d, token)))
            .collect();

        let sends = targets.iter().map(|(_, token)| {
            let message = PushMessage {
                device_token: token.clone(),
                title: title.to_string(),
                body: body.to_string(),
                data: data.clone(),
                channel_id: channel.map(str::to_string),
            };
            let push = self.push.clone();
            async move { push.send(&message).await }
        });
        let outcomes = join_all(sends).await;

        for ((device, _), outcome) in targets.iter().zip(outcomes) {
            let mut record = PushNotificationRecord::new(principal.id, device.id, title, body, &data);

            match outcome {
                Ok(response) => {
                    record.message_id = Some(response.provider_id.unwrap_or_else(|| "sent".to_string()));
                    metrics::record_notification("push", "sent");
                }
                Err(ProviderError::Unregistered(_)) => {
                    tracing::warn!(device_id = %device.id, "Push token unregistered, removing device");
                    record.error = Some("unregistered".to_string());
                    metrics::record_notification("push", "unregistered");
                    if let Err(e) = self.store.delete_device(device.id).await {
                        tracing::error!(device_id = %device.id, error = %e, "Failed to delete device");
                    }
                }
                Err(e) => {
                    tracing::error!(device_id = %device.id, error = %e, "Failed to send push");
                    record.error = Some(e.to_string());
                    metrics::record_notification("push", "failed");
                }
            }

            if let Err(e) = self.store.insert_push_notification(&record).await {
                tracing::error!(error = %e, "Failed to record push notification");
            }
            results.insert(device.id, record);
        }

        results
    }
}
