//! Slack channel: Web API with bot token.
//!
//! Text goes through `chat.postMessage`. Files (screenshots, CSV, PDF) use the
//! external upload flow: `files.getUploadURLExternal`, a raw upload, then
//! `files.completeUploadExternal` sharing the file into the channel.

use async_trait::async_trait;
use std::time::Duration;

use vizalert_core::traits::{NotificationError, Notifier};
use vizalert_core::types::{NotificationContent, ReportFormat, Table};

const SLACK_API: &str = "https://slack.com/api";

/// Slack error codes that point at Slack itself rather than the request.
const SLACK_SYSTEM_ERRORS: &[&str] = &[
    "ratelimited",
    "internal_error",
    "fatal_error",
    "service_unavailable",
    "request_timeout",
];

pub struct SlackNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channels: Vec<String>,
}

impl SlackNotifier {
    pub fn new(token: &str, channels: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: SLACK_API.to_string(),
            token: token.to_string(),
            channels,
        }
    }

    /// Point the notifier at another API root.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<serde_json::Value, NotificationError> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.api_url))
            .bearer_auth(&self.token)
            .json(body)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| NotificationError::system(format!("Slack {method} failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotificationError::new(
                format!("Slack {method} returned {status}"),
                status.as_u16(),
            ));
        }
        let reply: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| NotificationError::system(format!("Slack {method} reply: {e}")))?;
        check_reply(method, reply)
    }

    async fn upload(&self, channel: &str, filename: &str, bytes: &[u8], comment: &str) -> Result<(), NotificationError> {
        let resp = self
            .client
            .post(format!("{}/files.getUploadURLExternal", self.api_url))
            .bearer_auth(&self.token)
            .form(&[("filename", filename.to_string()), ("length", bytes.len().to_string())])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| NotificationError::system(format!("Slack upload URL failed: {e}")))?;
        let reply: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| NotificationError::system(format!("Slack upload URL reply: {e}")))?;
        let reply = check_reply("files.getUploadURLExternal", reply)?;
        let (Some(upload_url), Some(file_id)) = (reply["upload_url"].as_str(), reply["file_id"].as_str()) else {
            return Err(NotificationError::system("Slack upload URL reply is incomplete"));
        };

        let status = self
            .client
            .post(upload_url)
            .body(bytes.to_vec())
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| NotificationError::system(format!("Slack file upload failed: {e}")))?
            .status();
        if !status.is_success() {
            return Err(NotificationError::new(
                format!("Slack file upload returned {status}"),
                status.as_u16(),
            ));
        }

        self.call(
            "files.completeUploadExternal",
            &serde_json::json!({
                "files": [{"id": file_id, "title": filename}],
                "channel_id": channel,
                "initial_comment": comment,
            }),
        )
        .await?;
        Ok(())
    }

    /// Files to upload for `content`, with their names.
    fn files(content: &NotificationContent) -> Vec<(String, &[u8])> {
        let mut files: Vec<(String, &[u8])> = content
            .screenshots
            .iter()
            .enumerate()
            .map(|(i, png)| (format!("{}-{}.png", content.name, i + 1), png.as_slice()))
            .collect();
        if let (Some(data), Some(format)) = (&content.data, content.data_format) {
            let ext = match format {
                ReportFormat::Pdf | ReportFormat::DashboardPdf => "pdf",
                _ => "csv",
            };
            files.push((format!("{}.{ext}", content.name), data.as_slice()));
        }
        files
    }
}

fn check_reply(method: &str, reply: serde_json::Value) -> Result<serde_json::Value, NotificationError> {
    if reply["ok"].as_bool() == Some(true) {
        return Ok(reply);
    }
    let code = reply["error"].as_str().unwrap_or("unknown_error");
    let message = format!("Slack {method} error: {code}");
    if SLACK_SYSTEM_ERRORS.contains(&code) {
        Err(NotificationError::system(message))
    } else {
        Err(NotificationError::client(message))
    }
}

/// Slack mrkdwn message text for `content`.
pub fn message_text(content: &NotificationContent) -> String {
    if let Some(error) = &content.text {
        return format!("*{}*\n\nError: {}\n", content.name, error);
    }
    let mut text = format!("*{}*\n", content.name);
    if let Some(description) = &content.description {
        text.push_str(&format!("\n{description}\n"));
    }
    if let Some(url) = &content.url {
        text.push_str(&format!("\n<{url}|Explore in the BI app>\n"));
    }
    if let Some(table) = &content.embedded_data {
        text.push_str(&format!("\n```\n{}```\n", table_text(table)));
    }
    text
}

/// Plain-text table, one line per row, cells joined by ` | `.
pub fn table_text(table: &Table) -> String {
    let mut out = table.columns.join(" | ");
    out.push('\n');
    for row in &table.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    out
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        if self.channels.is_empty() {
            return Err(NotificationError::client("Slack recipient has no channel"));
        }
        let text = message_text(content);
        let files = Self::files(content);

        for channel in &self.channels {
            if files.is_empty() {
                self.call(
                    "chat.postMessage",
                    &serde_json::json!({"channel": channel, "text": text}),
                )
                .await?;
            } else {
                for (i, (filename, bytes)) in files.iter().enumerate() {
                    // Only the first file carries the message text.
                    let comment = if i == 0 { text.as_str() } else { "" };
                    self.upload(channel, filename, bytes, comment).await?;
                }
            }
            tracing::info!("💬 Report posted to Slack channel {channel}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use vizalert_core::types::{HeaderData, ReportScheduleType, ReportSource};

    fn content() -> NotificationContent {
        let mut content = NotificationContent::error(
            "Daily: Revenue",
            "",
            HeaderData {
                notification_type: ReportScheduleType::Report,
                notification_source: ReportSource::Chart,
                notification_format: ReportFormat::Text,
                chart_id: Some(3),
                dashboard_id: None,
                owners: vec![],
                execution_id: Uuid::new_v4(),
            },
        );
        content.text = None;
        content
    }

    #[test]
    fn test_reply_classification() {
        assert!(check_reply("m", json!({"ok": true})).is_ok());
        let err = check_reply("m", json!({"ok": false, "error": "channel_not_found"})).unwrap_err();
        assert!(!err.is_severe());
        let err = check_reply("m", json!({"ok": false, "error": "ratelimited"})).unwrap_err();
        assert!(err.is_severe());
    }

    #[test]
    fn test_text_message_with_table() {
        let mut content = content();
        content.url = Some("http://bi.local/x".into());
        content.embedded_data = Some(Table::new(
            vec!["day".into(), "total".into()],
            vec![vec![json!("mon"), json!(4)]],
        ));
        let text = message_text(&content);
        assert!(text.starts_with("*Daily: Revenue*"));
        assert!(text.contains("<http://bi.local/x|Explore in the BI app>"));
        assert!(text.contains("day | total\nmon | 4\n"));
    }

    #[test]
    fn test_error_message() {
        let mut content = content();
        content.text = Some("Unexpected missing csv file".into());
        assert_eq!(message_text(&content), "*Daily: Revenue*\n\nError: Unexpected missing csv file\n");
    }

    #[test]
    fn test_files_named_by_format() {
        let mut content = content();
        content.data = Some(b"%PDF".to_vec());
        content.data_format = Some(ReportFormat::Pdf);
        let files = SlackNotifier::files(&content);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "Daily: Revenue.pdf");
    }
}
