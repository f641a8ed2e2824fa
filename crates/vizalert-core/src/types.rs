//! Domain model: schedules, states, execution logs and notification content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VizAlertError};

/// Whether a schedule always delivers (report) or only when triggered (alert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportScheduleType {
    Alert,
    Report,
}

impl std::fmt::Display for ReportScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportScheduleType::Alert => write!(f, "Alert"),
            ReportScheduleType::Report => write!(f, "Report"),
        }
    }
}

/// State space of the execution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportState {
    Noop,
    Working,
    Success,
    Error,
    Grace,
}

impl ReportState {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportState::Noop => "Not triggered",
            ReportState::Working => "Working",
            ReportState::Success => "Success",
            ReportState::Error => "Error",
            ReportState::Grace => "On Grace",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Not triggered" => Ok(ReportState::Noop),
            "Working" => Ok(ReportState::Working),
            "Success" => Ok(ReportState::Success),
            "Error" => Ok(ReportState::Error),
            "On Grace" => Ok(ReportState::Grace),
            other => Err(VizAlertError::InvalidData(format!("unknown report state '{other}'"))),
        }
    }
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    /// Screenshot of the chart or dashboard.
    #[serde(rename = "PNG")]
    Visualization,
    /// Chart rows as CSV.
    #[serde(rename = "CSV")]
    Data,
    /// Chart rows embedded inline as a table.
    #[serde(rename = "TEXT")]
    Text,
    /// Table document: a single chart's rows or a composite dashboard document.
    #[serde(rename = "PDF")]
    Pdf,
    /// Composite dashboard document.
    #[serde(rename = "DASHBOARD_PDF")]
    DashboardPdf,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Visualization => "PNG",
            ReportFormat::Data => "CSV",
            ReportFormat::Text => "TEXT",
            ReportFormat::Pdf => "PDF",
            ReportFormat::DashboardPdf => "DASHBOARD_PDF",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PNG" => Ok(ReportFormat::Visualization),
            "CSV" => Ok(ReportFormat::Data),
            "TEXT" => Ok(ReportFormat::Text),
            "PDF" => Ok(ReportFormat::Pdf),
            "DASHBOARD_PDF" => Ok(ReportFormat::DashboardPdf),
            other => Err(VizAlertError::InvalidData(format!("unknown report format '{other}'"))),
        }
    }
}

/// Where the content of a schedule comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    Chart,
    Dashboard,
}

/// Strategy used to pick the identity a schedule executes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// The configured service account.
    Selenium,
    Creator,
    CreatorOwner,
    Modifier,
    ModifierOwner,
    Owner,
}

/// A user known to the BI application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// The identity a run acts as when contacting rendering and query collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<i64>,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: Option<i64>, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self::new(Some(user.id), user.username.clone())
    }
}

/// Explicit per-run context handed to every collaborator that needs to act
/// on behalf of the executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub executor: Identity,
}

/// Chart a schedule points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRef {
    pub id: i64,
    pub slice_name: String,
    #[serde(default)]
    pub digest: String,
    /// Saved query context; absent until the chart was rendered once.
    #[serde(default)]
    pub query_context: Option<serde_json::Value>,
}

/// Chart summary as listed in a dashboard's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceSummary {
    pub slice_id: i64,
    pub slice_name: String,
    /// Saved query context as a JSON string.
    #[serde(default)]
    pub query_context: Option<String>,
}

/// Dashboard a schedule points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRef {
    pub id: i64,
    pub dashboard_title: String,
    #[serde(default)]
    pub digest: String,
    /// Layout tree saved by the dashboard editor, keyed by node id.
    #[serde(default)]
    pub position_json: String,
    #[serde(default)]
    pub slices: Vec<SliceSummary>,
    #[serde(default)]
    pub native_filter_configuration: serde_json::Value,
}

/// Exactly one of chart or dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReportTarget {
    Chart(ChartRef),
    Dashboard(DashboardRef),
}

/// Delivery channel of a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientType {
    Email,
    Slack,
    Webhook,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Email => "Email",
            RecipientType::Slack => "Slack",
            RecipientType::Webhook => "Webhook",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Email" => Ok(RecipientType::Email),
            "Slack" => Ok(RecipientType::Slack),
            "Webhook" => Ok(RecipientType::Webhook),
            other => Err(VizAlertError::InvalidData(format!("unknown recipient type '{other}'"))),
        }
    }
}

/// A configured delivery target. `config` is channel specific, for example
/// `{"target": "ops@example.com"}` for email or `{"target": "#alerts"}` for Slack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub recipient_type: RecipientType,
    pub config: serde_json::Value,
}

impl Recipient {
    pub fn email(address: &str) -> Self {
        Self {
            recipient_type: RecipientType::Email,
            config: serde_json::json!({ "target": address }),
        }
    }

    /// The `target` field of the config, if any.
    pub fn target(&self) -> Option<&str> {
        self.config["target"].as_str()
    }
}

/// Alert validator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorType {
    NotNull,
    Operator,
}

/// A configured alert or report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSchedule {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schedule_type: ReportScheduleType,
    pub target: ReportTarget,
    pub report_format: ReportFormat,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub owners: Vec<User>,
    #[serde(default)]
    pub created_by: Option<User>,
    #[serde(default)]
    pub changed_by: Option<User>,
    /// Seconds during which repeat notifications are suppressed.
    #[serde(default)]
    pub grace_period: i64,
    /// Seconds a run may stay in WORKING before it is failed.
    #[serde(default)]
    pub working_timeout: Option<i64>,
    #[serde(default)]
    pub last_state: Option<ReportState>,
    #[serde(default)]
    pub last_eval_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_value: Option<f64>,
    #[serde(default)]
    pub last_value_row_json: Option<String>,
    #[serde(default)]
    pub force_screenshot: bool,
    #[serde(default)]
    pub extra: serde_json::Value,
    /// Alert trigger query.
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub database_id: Option<i64>,
    #[serde(default)]
    pub validator_type: Option<ValidatorType>,
    #[serde(default)]
    pub validator_config_json: Option<String>,
}

impl ReportSchedule {
    /// A report schedule with defaults for everything but the essentials.
    pub fn new(
        id: i64,
        name: &str,
        schedule_type: ReportScheduleType,
        target: ReportTarget,
        report_format: ReportFormat,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: None,
            schedule_type,
            target,
            report_format,
            recipients: Vec::new(),
            owners: Vec::new(),
            created_by: None,
            changed_by: None,
            grace_period: 60 * 60 * 4,
            working_timeout: Some(60 * 60),
            last_state: None,
            last_eval_at: None,
            last_value: None,
            last_value_row_json: None,
            force_screenshot: false,
            extra: serde_json::Value::Null,
            sql: None,
            database_id: None,
            validator_type: None,
            validator_config_json: None,
        }
    }

    pub fn is_alert(&self) -> bool {
        self.schedule_type == ReportScheduleType::Alert
    }

    pub fn chart(&self) -> Option<&ChartRef> {
        match &self.target {
            ReportTarget::Chart(chart) => Some(chart),
            ReportTarget::Dashboard(_) => None,
        }
    }

    pub fn dashboard(&self) -> Option<&DashboardRef> {
        match &self.target {
            ReportTarget::Dashboard(dashboard) => Some(dashboard),
            ReportTarget::Chart(_) => None,
        }
    }

    pub fn source(&self) -> ReportSource {
        match &self.target {
            ReportTarget::Chart(_) => ReportSource::Chart,
            ReportTarget::Dashboard(_) => ReportSource::Dashboard,
        }
    }

    /// Saved dashboard state (`extra.dashboard`) that requires a permalink.
    pub fn dashboard_state(&self) -> Option<&serde_json::Value> {
        self.extra
            .get("dashboard")
            .filter(|state| !state.is_null() && state.as_object().is_none_or(|o| !o.is_empty()))
    }
}

/// One row per state transition. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportExecutionLog {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub report_schedule_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub value: Option<f64>,
    pub value_row_json: Option<String>,
    pub state: ReportState,
    pub error_message: Option<String>,
}

/// In-memory tabular snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build from `[{col: value, ...}]` records, ordering cells by `columns`.
    pub fn from_records(columns: Vec<String>, records: &[serde_json::Value]) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| record.get(col).cloned().unwrap_or(serde_json::Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Opaque chart query payload understood by the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryContext(pub serde_json::Value);

impl QueryContext {
    /// Parse a saved query context string.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }

    pub fn with_result_format(mut self, format: &str) -> Self {
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("result_format".into(), serde_json::Value::String(format.into()));
        }
        self
    }
}

/// Metadata attached to every notification and used for log correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderData {
    pub notification_type: ReportScheduleType,
    pub notification_source: ReportSource,
    pub notification_format: ReportFormat,
    pub chart_id: Option<i64>,
    pub dashboard_id: Option<i64>,
    pub owners: Vec<i64>,
    pub execution_id: Uuid,
}

/// Everything a channel needs to deliver one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub name: String,
    pub url: Option<String>,
    pub screenshots: Vec<Vec<u8>>,
    pub description: Option<String>,
    /// CSV or document bytes, tagged by `data_format`.
    pub data: Option<Vec<u8>>,
    pub data_format: Option<ReportFormat>,
    pub embedded_data: Option<Table>,
    /// Error text replacing the payload.
    pub text: Option<String>,
    pub header_data: HeaderData,
}

impl NotificationContent {
    /// Content carrying only an error text.
    pub fn error(name: &str, text: &str, header_data: HeaderData) -> Self {
        Self {
            name: name.to_string(),
            url: None,
            screenshots: Vec::new(),
            description: None,
            data: None,
            data_format: None,
            embedded_data: None,
            text: Some(text.to_string()),
            header_data,
        }
    }

    /// Number of populated payload kinds; never more than one.
    pub fn payload_kinds(&self) -> usize {
        [
            !self.screenshots.is_empty(),
            self.data.is_some(),
            self.embedded_data.is_some(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count()
    }
}

/// Previously used password of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub old_password: Option<String>,
    pub timestamp: DateTime<Utc>,
}
