//! VizAlert configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VizAlertError};
use crate::types::ExecutorType;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VizAlertConfig {
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl VizAlertConfig {
    /// Load config from the default path (~/.vizalert/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VizAlertError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VizAlertError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VizAlertError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the VizAlert home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vizalert")
    }
}

/// Alert & report execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Ordered executor strategies; the first one that resolves wins.
    #[serde(default = "default_execute_as")]
    pub execute_as: Vec<ExecutorType>,
    /// Service account used by the `selenium` executor strategy.
    #[serde(default = "default_selenium_user")]
    pub selenium_user: String,
    /// Log notifications instead of sending them.
    #[serde(default)]
    pub notification_dry_run: bool,
    /// Attach rendered content to alerts, not only to reports.
    #[serde(default = "bool_true")]
    pub alerts_attach_reports: bool,
    /// Soft time limit applied to every rendering or data collaborator call.
    #[serde(default = "default_soft_time_limit")]
    pub soft_time_limit_secs: u64,
    #[serde(default)]
    pub webdriver_window: WebdriverWindows,
}

fn bool_true() -> bool { true }
fn default_execute_as() -> Vec<ExecutorType> { vec![ExecutorType::Owner] }
fn default_selenium_user() -> String { "admin".into() }
fn default_soft_time_limit() -> u64 { 300 }

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            execute_as: default_execute_as(),
            selenium_user: default_selenium_user(),
            notification_dry_run: false,
            alerts_attach_reports: true,
            soft_time_limit_secs: default_soft_time_limit(),
            webdriver_window: WebdriverWindows::default(),
        }
    }
}

/// Browser window size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Window sizes used when capturing charts and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebdriverWindows {
    #[serde(default = "default_slice_window")]
    pub slice: WindowSize,
    #[serde(default = "default_dashboard_window")]
    pub dashboard: WindowSize,
}

fn default_slice_window() -> WindowSize { WindowSize::new(3000, 1200) }
fn default_dashboard_window() -> WindowSize { WindowSize::new(1600, 2000) }

impl Default for WebdriverWindows {
    fn default() -> Self {
        Self {
            slice: default_slice_window(),
            dashboard: default_dashboard_window(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.vizalert/vizalert.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Rendering collaborators: the BI web app, the screenshot service and the
/// document engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Public base URL of the BI web application.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token used for API calls made on behalf of the executor.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Headless browser service that captures screenshots.
    #[serde(default = "default_screenshot_service_url")]
    pub screenshot_service_url: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub document: DocumentConfig,
}

fn default_base_url() -> String { "http://localhost:8088".into() }
fn default_screenshot_service_url() -> String { "http://localhost:3000".into() }
fn default_http_timeout() -> u64 { 60 }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            screenshot_service_url: default_screenshot_service_url(),
            http_timeout_secs: default_http_timeout(),
            document: DocumentConfig::default(),
        }
    }
}

/// Document engine: "wkhtmltopdf" renders PDF, "html" emits the HTML as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_document_engine")]
    pub engine: String,
    #[serde(default = "default_wkhtmltopdf_path")]
    pub wkhtmltopdf_path: String,
    #[serde(default = "default_page_size")]
    pub page_size: String,
    #[serde(default = "default_orientation")]
    pub orientation: String,
}

fn default_document_engine() -> String { "wkhtmltopdf".into() }
fn default_wkhtmltopdf_path() -> String { "wkhtmltopdf".into() }
fn default_page_size() -> String { "A4".into() }
fn default_orientation() -> String { "Landscape".into() }

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            engine: default_document_engine(),
            wkhtmltopdf_path: default_wkhtmltopdf_path(),
            page_size: default_page_size(),
            orientation: default_orientation(),
        }
    }
}

/// SMTP settings for the email channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_smtp_host() -> String { "localhost".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_mail_from() -> String { "vizalert@localhost".into() }
fn default_subject_prefix() -> String { "[Report] ".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_mail_from(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// Slack bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub api_token: String,
}

/// Outbound webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

fn default_webhook_timeout() -> u64 { 10 }

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout(),
            headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = VizAlertConfig::from_toml("").unwrap();
        assert_eq!(config.reports.execute_as, vec![ExecutorType::Owner]);
        assert_eq!(config.reports.soft_time_limit_secs, 300);
        assert!(!config.reports.notification_dry_run);
        assert_eq!(config.render.document.engine, "wkhtmltopdf");
    }

    #[test]
    fn test_partial_override() {
        let config = VizAlertConfig::from_toml(
            r#"
            [reports]
            execute_as = ["creator_owner", "selenium"]
            notification_dry_run = true

            [reports.webdriver_window]
            slice = { width = 800, height = 600 }
            "#,
        )
        .unwrap();
        assert_eq!(
            config.reports.execute_as,
            vec![ExecutorType::CreatorOwner, ExecutorType::Selenium]
        );
        assert!(config.reports.notification_dry_run);
        assert_eq!(config.reports.webdriver_window.slice, WindowSize::new(800, 600));
        assert_eq!(config.reports.webdriver_window.dashboard, WindowSize::new(1600, 2000));
    }

    #[test]
    fn test_invalid_toml() {
        let err = VizAlertConfig::from_toml("reports = 3").unwrap_err();
        assert!(matches!(err, VizAlertError::Config(_)));
    }
}
