//! Email channel: SMTP delivery through async lettre.
//!
//! Screenshots are embedded inline (`cid:` references inside the HTML body),
//! CSV and PDF payloads travel as attachments, embedded tables are rendered as
//! HTML and error texts replace the body.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use vizalert_core::config::EmailConfig;
use vizalert_core::traits::{NotificationError, Notifier};
use vizalert_core::types::{NotificationContent, ReportFormat};
use vizalert_render::document::{DOCUMENT_CSS, escape_html, table_to_html};

/// Addresses for one email recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailAddresses {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl EmailAddresses {
    /// Parse `{"target": "a@x, b@y", "ccTarget": ..., "bccTarget": ...}`.
    pub fn from_config(config: &serde_json::Value) -> Self {
        Self {
            to: split_addresses(config["target"].as_str()),
            cc: split_addresses(config["ccTarget"].as_str()),
            bcc: split_addresses(config["bccTarget"].as_str()),
        }
    }
}

/// Split a `,` or `;` separated address list.
pub fn split_addresses(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split([',', ';'])
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct EmailNotifier {
    config: EmailConfig,
    addresses: EmailAddresses,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, addresses: EmailAddresses) -> Self {
        Self { config, addresses }
    }

    /// Assemble the MIME message for `content`.
    pub fn build_message(&self, content: &NotificationContent) -> Result<Message, NotificationError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| NotificationError::client(format!("Invalid from address: {e}")))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(format!("{}{}", self.config.subject_prefix, content.name));
        for addr in &self.addresses.to {
            builder = builder.to(parse_mailbox(addr)?);
        }
        for addr in &self.addresses.cc {
            builder = builder.cc(parse_mailbox(addr)?);
        }
        for addr in &self.addresses.bcc {
            builder = builder.bcc(parse_mailbox(addr)?);
        }

        let cids: Vec<String> = (0..content.screenshots.len())
            .map(|i| format!("screenshot-{i}@{}", content.header_data.execution_id.simple()))
            .collect();

        let mut related = MultiPart::related().singlepart(SinglePart::html(render_body(content, &cids)));
        for (cid, image) in cids.iter().zip(&content.screenshots) {
            related = related.singlepart(
                Attachment::new_inline(cid.clone()).body(image.clone(), content_type("image/png")?),
            );
        }

        let mut mixed = MultiPart::mixed().multipart(related);
        if let (Some(data), Some(format)) = (&content.data, content.data_format) {
            let (extension, mime) = match format {
                ReportFormat::Data => ("csv", "text/csv"),
                ReportFormat::Pdf | ReportFormat::DashboardPdf => ("pdf", "application/pdf"),
                ReportFormat::Visualization => ("png", "image/png"),
                ReportFormat::Text => ("txt", "text/plain"),
            };
            mixed = mixed.singlepart(
                Attachment::new(format!("{}.{extension}", content.name)).body(data.clone(), content_type(mime)?),
            );
        }

        builder
            .multipart(mixed)
            .map_err(|e| NotificationError::client(format!("Build email: {e}")))
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotificationError> {
    addr.parse()
        .map_err(|e| NotificationError::client(format!("Invalid address '{addr}': {e}")))
}

fn content_type(mime: &str) -> Result<ContentType, NotificationError> {
    ContentType::parse(mime).map_err(|e| NotificationError::system(format!("Content type {mime}: {e}")))
}

/// HTML body: error text, or description, link, table and inline images.
pub fn render_body(content: &NotificationContent, cids: &[String]) -> String {
    let mut html = String::from(DOCUMENT_CSS);
    if let Some(text) = &content.text {
        html.push_str(&format!("<p><b>Error:</b> {}</p>\n", escape_html(text)));
        return html;
    }
    if let Some(description) = &content.description {
        html.push_str(&format!("<p>{}</p>\n", escape_html(description)));
    }
    if let Some(url) = &content.url {
        html.push_str(&format!(
            "<b><a href=\"{}\">Explore in the BI app</a></b><p></p>\n",
            escape_html(url)
        ));
    }
    if let Some(table) = &content.embedded_data {
        html.push_str(&table_to_html(table));
    }
    for cid in cids {
        html.push_str(&format!("<img width=\"1000\" src=\"cid:{cid}\">\n"));
    }
    html
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        if self.addresses.to.is_empty() {
            return Err(NotificationError::client("Email recipient has no target address"));
        }
        let email = self.build_message(content)?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| NotificationError::system(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port);
        if !self.config.username.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        transport.build().send(email).await.map_err(|e| {
            // 5xx SMTP replies mean the message itself was rejected.
            if e.is_permanent() {
                NotificationError::client(format!("SMTP rejected: {e}"))
            } else {
                NotificationError::system(format!("SMTP send: {e}"))
            }
        })?;

        tracing::info!("📧 Report email sent to: {}", self.addresses.to.join(", "));
        Ok(())
    }
}
