//! Generic HTTP webhook: POST the notification as JSON.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;

use vizalert_core::traits::{NotificationError, Notifier};
use vizalert_core::types::NotificationContent;

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: Vec<(String, String)>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// JSON body posted to the webhook. Binary payloads are base64 encoded.
pub fn payload(content: &NotificationContent) -> serde_json::Value {
    serde_json::json!({
        "name": content.name,
        "description": content.description,
        "url": content.url,
        "text": content.text,
        "header": content.header_data,
        "screenshots": content.screenshots.iter().map(|s| STANDARD.encode(s)).collect::<Vec<_>>(),
        "data": content.data.as_ref().map(|d| STANDARD.encode(d)),
        "data_format": content.data_format.map(|f| f.as_str()),
        "embedded_data": content.embedded_data,
        "sent_at": chrono::Utc::now().to_rfc3339(),
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        let mut req = self.client.post(&self.url).json(&payload(content)).timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| NotificationError::system(format!("Webhook send failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotificationError::new(
                format!("Webhook {status}: {body}"),
                status.as_u16(),
            ));
        }

        tracing::info!("🔗 Webhook notification delivered to {}", self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vizalert_core::types::{HeaderData, ReportFormat, ReportScheduleType, ReportSource};

    #[test]
    fn test_payload_encodes_binary() {
        let mut content = NotificationContent::error(
            "Ops: Board",
            "",
            HeaderData {
                notification_type: ReportScheduleType::Alert,
                notification_source: ReportSource::Dashboard,
                notification_format: ReportFormat::Visualization,
                chart_id: None,
                dashboard_id: Some(9),
                owners: vec![1, 2],
                execution_id: Uuid::new_v4(),
            },
        );
        content.text = None;
        content.screenshots = vec![b"png".to_vec()];

        let body = payload(&content);
        assert_eq!(body["name"], "Ops: Board");
        assert_eq!(body["screenshots"][0], "cG5n");
        assert!(body["data"].is_null());
        assert_eq!(body["header"]["dashboard_id"], 9);
    }
}
