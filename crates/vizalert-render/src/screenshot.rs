//! Chart and dashboard screenshots via a headless browser service.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use vizalert_core::config::WindowSize;
use vizalert_core::error::{Result, VizAlertError};
use vizalert_core::traits::ScreenshotDriver;
use vizalert_core::types::Identity;

/// Chart pages hide the navigation in standalone mode 1.
const CHART_STANDALONE_HIDE_NAV: &str = "1";
/// Dashboard pages render for reports in standalone mode 3.
const DASHBOARD_STANDALONE_REPORT: &str = "3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotKind {
    Chart,
    Dashboard,
}

/// A screenshot request for one chart or dashboard.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub kind: ScreenshotKind,
    pub url: String,
    pub digest: String,
    pub window_size: WindowSize,
    pub thumb_size: WindowSize,
}

impl Screenshot {
    /// Chart capture; the URL is switched to standalone mode.
    pub fn chart(url: &str, digest: &str, window_size: WindowSize) -> Self {
        Self {
            kind: ScreenshotKind::Chart,
            url: modify_url_query(url, "standalone", CHART_STANDALONE_HIDE_NAV),
            digest: digest.to_string(),
            window_size,
            thumb_size: window_size,
        }
    }

    /// Dashboard capture; the URL is switched to report mode.
    pub fn dashboard(url: &str, digest: &str, window_size: WindowSize) -> Self {
        Self {
            kind: ScreenshotKind::Dashboard,
            url: modify_url_query(url, "standalone", DASHBOARD_STANDALONE_REPORT),
            digest: digest.to_string(),
            window_size,
            thumb_size: window_size,
        }
    }

    /// DOM element the browser captures.
    pub fn element(&self) -> &'static str {
        match self.kind {
            ScreenshotKind::Chart => "chart-container",
            ScreenshotKind::Dashboard => "standalone",
        }
    }

    pub fn thumbnail_type(&self) -> &'static str {
        match self.kind {
            ScreenshotKind::Chart => "chart",
            ScreenshotKind::Dashboard => "dashboard",
        }
    }

    /// Rendering cache key derived from the content digest and sizes.
    pub fn cache_key(&self) -> String {
        let args = serde_json::json!({
            "thumbnail_type": self.thumbnail_type(),
            "digest": self.digest,
            "type": "thumb",
            "window_size": [self.window_size.width, self.window_size.height],
            "thumb_size": [self.thumb_size.width, self.thumb_size.height],
        });
        let hash = Sha256::digest(args.to_string().as_bytes());
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Capture through the driver as `identity`.
    pub async fn capture(
        &self,
        driver: &dyn ScreenshotDriver,
        identity: &Identity,
    ) -> Result<Option<Vec<u8>>> {
        tracing::debug!(
            "📸 Capturing {} screenshot {} ({})",
            self.thumbnail_type(),
            self.url,
            self.cache_key()
        );
        driver
            .get_screenshot(&self.url, self.element(), self.window_size, identity)
            .await
    }
}

/// Set `key=value` in the query string of `url`, replacing an existing value.
pub fn modify_url_query(url: &str, key: &str, value: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| k != key)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed
                .query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair(key, value);
            parsed.to_string()
        }
        Err(_) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}{key}={value}")
        }
    }
}

/// Screenshot driver backed by a headless-browser HTTP service.
///
/// The service receives `POST {service_url}/screenshot` with the page URL,
/// the element selector, the viewport and the user to log in as, and answers
/// with PNG bytes (or 204 when nothing was captured).
pub struct RemoteScreenshotDriver {
    client: reqwest::Client,
    service_url: String,
    timeout: Duration,
}

impl RemoteScreenshotDriver {
    pub fn new(service_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url: service_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl ScreenshotDriver for RemoteScreenshotDriver {
    async fn get_screenshot(
        &self,
        url: &str,
        element: &str,
        window: WindowSize,
        identity: &Identity,
    ) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .post(format!("{}/screenshot", self.service_url))
            .json(&serde_json::json!({
                "url": url,
                "selector": format!(".{element}"),
                "viewport": {"width": window.width, "height": window.height},
                "user": identity.username,
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VizAlertError::Render(format!("Screenshot service unreachable: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VizAlertError::Render(format!(
                "Screenshot service error {status}: {body}"
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| VizAlertError::Render(format!("Screenshot body: {e}")))?;
        if bytes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(bytes.to_vec()))
        }
    }
}
