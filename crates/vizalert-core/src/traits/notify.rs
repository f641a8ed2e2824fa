use async_trait::async_trait;

use crate::types::{NotificationContent, Recipient};

/// Failure reported by a notification channel. `status` follows HTTP
/// semantics: 5xx is a system failure, anything else a client failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NotificationError {
    pub message: String,
    pub status: u16,
}

impl NotificationError {
    pub fn new(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// Invalid recipient configuration and similar caller mistakes.
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(message, 400)
    }

    /// Channel outages and unexpected failures.
    pub fn system(message: impl Into<String>) -> Self {
        Self::new(message, 500)
    }

    pub fn is_severe(&self) -> bool {
        self.status >= 500
    }
}

/// One delivery attempt to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, content: &NotificationContent) -> Result<(), NotificationError>;
}

/// Builds the channel-specific notifier for a recipient.
pub trait NotificationFactory: Send + Sync {
    fn create(&self, recipient: &Recipient) -> Result<Box<dyn Notifier>, NotificationError>;
}
