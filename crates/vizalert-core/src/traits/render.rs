use async_trait::async_trait;

use crate::config::WindowSize;
use crate::error::Result;
use crate::types::Identity;

/// Headless browser capture.
#[async_trait]
pub trait ScreenshotDriver: Send + Sync {
    /// Capture `element` on the page at `url`, logged in as `identity`.
    /// `Ok(None)` means the page rendered but produced no image.
    async fn get_screenshot(
        &self,
        url: &str,
        element: &str,
        window: WindowSize,
        identity: &Identity,
    ) -> Result<Option<Vec<u8>>>;
}

/// Page and layout options handed to the document engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOptions {
    pub page_size: String,
    pub orientation: String,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            page_size: "A4".into(),
            orientation: "Landscape".into(),
        }
    }
}

/// Turns an HTML document into deliverable bytes (PDF or HTML).
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, html: &str, options: &DocumentOptions) -> Result<Vec<u8>>;
}

/// Named routes of the BI web application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Explore view of a chart.
    Explore,
    /// Chart data API.
    ChartData,
    Dashboard,
    DashboardPermalink,
}

/// Resolves absolute URLs of the BI web application.
pub trait UrlResolver: Send + Sync {
    fn url_for(&self, route: Route, params: &[(&str, String)]) -> String;
}

/// Persists dashboard state and returns a permalink key.
#[async_trait]
pub trait PermalinkStore: Send + Sync {
    async fn create_dashboard_permalink(&self, dashboard_id: i64, state: &serde_json::Value) -> Result<String>;
}
