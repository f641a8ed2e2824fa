//! Recipient type → channel notifier.

use vizalert_core::config::VizAlertConfig;
use vizalert_core::traits::{NotificationError, NotificationFactory, Notifier};
use vizalert_core::types::{Recipient, RecipientType};

use crate::email::{EmailAddresses, EmailNotifier, split_addresses};
use crate::slack::SlackNotifier;
use crate::webhook::WebhookNotifier;

/// Builds notifiers from the channel sections of the config.
pub struct ChannelNotificationFactory {
    config: VizAlertConfig,
}

impl ChannelNotificationFactory {
    pub fn new(config: VizAlertConfig) -> Self {
        Self { config }
    }
}

impl NotificationFactory for ChannelNotificationFactory {
    fn create(&self, recipient: &Recipient) -> Result<Box<dyn Notifier>, NotificationError> {
        match recipient.recipient_type {
            RecipientType::Email => Ok(Box::new(EmailNotifier::new(
                self.config.email.clone(),
                EmailAddresses::from_config(&recipient.config),
            ))),
            RecipientType::Slack => {
                if self.config.slack.api_token.is_empty() {
                    return Err(NotificationError::client("Slack API token is not configured"));
                }
                Ok(Box::new(SlackNotifier::new(
                    &self.config.slack.api_token,
                    split_addresses(recipient.target()),
                )))
            }
            RecipientType::Webhook => {
                let url = recipient
                    .target()
                    .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
                    .ok_or_else(|| NotificationError::client("Webhook recipient needs an http(s) target"))?;
                let mut headers = self.config.webhook.headers.clone();
                if let Some(extra) = recipient.config["headers"].as_object() {
                    headers.extend(
                        extra
                            .iter()
                            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string()))),
                    );
                }
                Ok(Box::new(WebhookNotifier::new(url, headers, self.config.webhook.timeout_secs)))
            }
        }
    }
}
