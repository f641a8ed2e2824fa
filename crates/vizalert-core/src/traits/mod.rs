//! Collaborator traits: the boundaries to everything this engine does not own.

pub mod notify;
pub mod query;
pub mod render;

pub use notify::{NotificationError, NotificationFactory, Notifier};
pub use query::{QueryExecutor, SqlRunner};
pub use render::{DocumentOptions, DocumentRenderer, PermalinkStore, Route, ScreenshotDriver, UrlResolver};
