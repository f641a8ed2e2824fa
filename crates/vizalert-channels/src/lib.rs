//! # VizAlert Channels
//!
//! Notification delivery for executed reports and alerts.
//! - Email (SMTP via lettre, inline screenshots + attachments)
//! - Slack (Web API, file uploads)
//! - Webhook (JSON POST)

pub mod email;
pub mod factory;
pub mod slack;
pub mod webhook;

pub use email::EmailNotifier;
pub use factory::ChannelNotificationFactory;
pub use slack::SlackNotifier;
pub use webhook::WebhookNotifier;
