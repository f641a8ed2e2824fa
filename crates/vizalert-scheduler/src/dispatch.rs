//! Fan-out of one notification to every recipient, collecting failures.

use vizalert_core::traits::{NotificationError, NotificationFactory};
use vizalert_core::types::{NotificationContent, Recipient};

use crate::error::{ErrorLevel, NotificationFailure, ReportScheduleError, Result};

impl From<&NotificationError> for NotificationFailure {
    fn from(e: &NotificationError) -> Self {
        Self {
            message: e.message.clone(),
            level: if e.is_severe() { ErrorLevel::Error } else { ErrorLevel::Warning },
        }
    }
}

/// Send `content` to each recipient in order. Every recipient is attempted
/// even when an earlier one fails; failures are raised together afterwards.
pub async fn send_notifications(
    factory: &dyn NotificationFactory,
    content: &NotificationContent,
    recipients: &[Recipient],
    dry_run: bool,
    schedule_name: &str,
) -> Result<()> {
    let mut failures: Vec<NotificationFailure> = Vec::new();

    for recipient in recipients {
        if dry_run {
            tracing::info!(
                "Would send notification for alert {}, to {}",
                schedule_name,
                recipient.config
            );
            continue;
        }
        let outcome = match factory.create(recipient) {
            Ok(notifier) => notifier.send(content).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(
                "⚠️ Notification to {} recipient failed [{}]: {}",
                recipient.recipient_type.as_str(),
                content.header_data.execution_id,
                e
            );
            failures.push(NotificationFailure::from(&e));
        }
    }

    if failures.iter().any(|f| f.level == ErrorLevel::Error) {
        return Err(ReportScheduleError::SystemErrors(failures));
    }
    if !failures.is_empty() {
        return Err(ReportScheduleError::ClientErrors(failures));
    }
    Ok(())
}
