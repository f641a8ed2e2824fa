//! Collaborators shared by every execution.

use std::sync::Arc;
use std::time::Duration;

use vizalert_core::config::ReportsConfig;
use vizalert_core::traits::{
    DocumentOptions, DocumentRenderer, NotificationFactory, PermalinkStore, QueryExecutor, ScreenshotDriver,
    UrlResolver,
};

use crate::alert::AlertEvaluator;
use crate::persistence::ReportDb;

pub struct Services {
    pub db: Arc<ReportDb>,
    pub config: ReportsConfig,
    pub document_options: DocumentOptions,
    pub urls: Arc<dyn UrlResolver>,
    pub screenshots: Arc<dyn ScreenshotDriver>,
    pub queries: Arc<dyn QueryExecutor>,
    pub documents: Arc<dyn DocumentRenderer>,
    pub permalinks: Arc<dyn PermalinkStore>,
    pub alerts: Arc<dyn AlertEvaluator>,
    pub notifications: Arc<dyn NotificationFactory>,
}

impl Services {
    /// Budget for each rendering or query call.
    pub fn soft_time_limit(&self) -> Duration {
        Duration::from_secs(self.config.soft_time_limit_secs)
    }
}
