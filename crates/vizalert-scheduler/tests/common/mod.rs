//! In-memory collaborators and schedule fixtures for execution tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use vizalert_core::config::ReportsConfig;
use vizalert_core::traits::{
    DocumentOptions, NotificationError, NotificationFactory, Notifier, PermalinkStore, QueryExecutor,
    ScreenshotDriver,
};
use vizalert_core::types::{
    ChartRef, DashboardRef, ExecutionContext, Identity, NotificationContent, QueryContext, Recipient,
    ReportExecutionLog, ReportFormat, ReportSchedule, ReportScheduleType, ReportState, ReportTarget, SliceSummary,
    Table, User,
};
use vizalert_core::{VizAlertError, config::WindowSize};
use vizalert_render::{BaseUrlResolver, HtmlDocumentRenderer};
use vizalert_scheduler::{AlertEvaluator, AsyncExecuteReportSchedule, ReportDb, ReportScheduleError, Services};

pub const PNG: &[u8] = b"\x89PNG fake";

// ─── Fakes ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeScreenshots {
    pub calls: Mutex<Vec<String>>,
    pub empty: Mutex<bool>,
    /// Answer with zero bytes instead of no image.
    pub zero_bytes: Mutex<bool>,
    pub fail: Mutex<bool>,
    pub delay: Mutex<Option<std::time::Duration>>,
    /// Schedule removed from the store while the capture runs.
    pub delete_during_capture: Mutex<Option<(Arc<ReportDb>, i64)>>,
}

#[async_trait]
impl ScreenshotDriver for FakeScreenshots {
    async fn get_screenshot(
        &self,
        url: &str,
        _element: &str,
        _window: WindowSize,
        _identity: &Identity,
    ) -> vizalert_core::Result<Option<Vec<u8>>> {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((db, id)) = self.delete_during_capture.lock().unwrap().take() {
            db.delete_schedule(id).unwrap();
        }
        if *self.fail.lock().unwrap() {
            return Err(VizAlertError::Render("browser crashed".into()));
        }
        if *self.empty.lock().unwrap() {
            return Ok(None);
        }
        if *self.zero_bytes.lock().unwrap() {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(PNG.to_vec()))
    }
}

/// Returns a fixed table; records every query context it runs.
pub struct FakeQueries {
    pub table: Mutex<Table>,
    pub runs: Mutex<Vec<QueryContext>>,
    pub data_urls: Mutex<Vec<String>>,
    pub fail_charts: Mutex<Vec<i64>>,
    pub delay: Mutex<Option<std::time::Duration>>,
}

impl Default for FakeQueries {
    fn default() -> Self {
        Self {
            table: Mutex::new(Table::new(
                vec!["region".into(), "total".into()],
                vec![vec![json!("north"), json!(10)], vec![json!("south"), json!(7)]],
            )),
            runs: Mutex::new(Vec::new()),
            data_urls: Mutex::new(Vec::new()),
            fail_charts: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }
}

#[async_trait]
impl QueryExecutor for FakeQueries {
    async fn run(&self, query: &QueryContext, _force_cached: bool, _ctx: &ExecutionContext) -> vizalert_core::Result<Table> {
        self.runs.lock().unwrap().push(query.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let chart_id = query.0["form_data"]["slice_id"].as_i64().unwrap_or_default();
        if self.fail_charts.lock().unwrap().contains(&chart_id) {
            return Err(VizAlertError::CacheLoad("cache miss".into()));
        }
        Ok(self.table.lock().unwrap().clone())
    }

    async fn chart_data(&self, url: &str, _ctx: &ExecutionContext) -> vizalert_core::Result<Table> {
        self.data_urls.lock().unwrap().push(url.to_string());
        Ok(self.table.lock().unwrap().clone())
    }
}

pub struct FakePermalinks;

#[async_trait]
impl PermalinkStore for FakePermalinks {
    async fn create_dashboard_permalink(&self, _dashboard_id: i64, _state: &serde_json::Value) -> vizalert_core::Result<String> {
        Ok("perma-key".into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Triggered,
    NotTriggered,
    Fails,
}

pub struct FakeAlert {
    pub outcome: Mutex<AlertOutcome>,
    pub evaluations: Mutex<usize>,
}

impl Default for FakeAlert {
    fn default() -> Self {
        Self { outcome: Mutex::new(AlertOutcome::Triggered), evaluations: Mutex::new(0) }
    }
}

#[async_trait]
impl AlertEvaluator for FakeAlert {
    async fn evaluate(
        &self,
        schedule: &mut ReportSchedule,
        _ctx: &ExecutionContext,
        _deadline: Instant,
    ) -> Result<bool, ReportScheduleError> {
        *self.evaluations.lock().unwrap() += 1;
        schedule.last_value = Some(42.0);
        match *self.outcome.lock().unwrap() {
            AlertOutcome::Triggered => Ok(true),
            AlertOutcome::NotTriggered => Ok(false),
            AlertOutcome::Fails => Err(ReportScheduleError::AlertQuery("db offline".into())),
        }
    }
}

/// One delivery attempt seen by the notification fakes.
#[derive(Debug, Clone)]
pub struct Sent {
    pub target: String,
    pub content: NotificationContent,
}

/// Records every attempt; targets listed in `failures` fail with the status.
#[derive(Default)]
pub struct RecordingFactory {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    pub failures: Mutex<Vec<(String, u16)>>,
}

struct RecordingNotifier {
    target: String,
    status: Option<u16>,
    sent: Arc<Mutex<Vec<Sent>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, content: &NotificationContent) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(Sent { target: self.target.clone(), content: content.clone() });
        match self.status {
            Some(status) => Err(NotificationError::new(format!("delivery to {} failed", self.target), status)),
            None => Ok(()),
        }
    }
}

impl NotificationFactory for RecordingFactory {
    fn create(&self, recipient: &Recipient) -> Result<Box<dyn Notifier>, NotificationError> {
        let target = recipient.target().unwrap_or_default().to_string();
        let status = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, s)| *s);
        Ok(Box::new(RecordingNotifier { target, status, sent: self.sent.clone() }))
    }
}

impl RecordingFactory {
    pub fn fail(&self, target: &str, status: u16) {
        self.failures.lock().unwrap().push((target.to_string(), status));
    }

    pub fn sent_to(&self, target: &str) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.target == target)
            .cloned()
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

// ─── Harness ─────────────────────────────────────────────────

pub struct Harness {
    pub services: Services,
    pub db: Arc<ReportDb>,
    pub screenshots: Arc<FakeScreenshots>,
    pub queries: Arc<FakeQueries>,
    pub alert: Arc<FakeAlert>,
    pub notifications: Arc<RecordingFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReportsConfig::default())
    }

    pub fn with_config(config: ReportsConfig) -> Self {
        let db = Arc::new(ReportDb::open_in_memory().unwrap());
        let screenshots = Arc::new(FakeScreenshots::default());
        let queries = Arc::new(FakeQueries::default());
        let alert = Arc::new(FakeAlert::default());
        let notifications = Arc::new(RecordingFactory::default());
        let services = Services {
            db: db.clone(),
            config,
            document_options: DocumentOptions::default(),
            urls: Arc::new(BaseUrlResolver::new("http://bi.local")),
            screenshots: screenshots.clone(),
            queries: queries.clone(),
            documents: Arc::new(HtmlDocumentRenderer),
            permalinks: Arc::new(FakePermalinks),
            alerts: alert.clone(),
            notifications: notifications.clone(),
        };
        Self { services, db, screenshots, queries, alert, notifications }
    }

    pub fn save(&self, schedule: &ReportSchedule) {
        self.db.save_schedule(schedule).unwrap();
    }

    pub async fn execute(&self, schedule_id: i64) -> Result<(), ReportScheduleError> {
        self.execute_tracked(schedule_id).await.1
    }

    /// Execute and return the execution id alongside the outcome.
    pub async fn execute_tracked(&self, schedule_id: i64) -> (Uuid, Result<(), ReportScheduleError>) {
        let task_id = Uuid::new_v4();
        let outcome = AsyncExecuteReportSchedule::new(task_id, schedule_id, Utc::now())
            .run(&self.services)
            .await;
        (task_id, outcome)
    }

    pub fn schedule(&self, id: i64) -> ReportSchedule {
        self.db.find_schedule(id).unwrap().unwrap()
    }

    pub fn logs(&self, id: i64) -> Vec<ReportExecutionLog> {
        self.db.logs_for_schedule(id).unwrap()
    }

    pub fn states(&self, id: i64) -> Vec<ReportState> {
        self.logs(id).iter().map(|l| l.state).collect()
    }

    /// Backdated log row, as left behind by an earlier execution.
    pub fn past_log(&self, id: i64, state: ReportState, message: Option<&str>, ago_secs: i64) {
        let at = Utc::now() - Duration::seconds(ago_secs);
        self.db
            .insert_log(&ReportExecutionLog {
                id: None,
                uuid: Uuid::new_v4(),
                report_schedule_id: id,
                scheduled_at: at,
                start_at: at,
                end_at: at,
                value: None,
                value_row_json: None,
                state,
                error_message: message.map(str::to_string),
            })
            .unwrap();
    }

    /// Put the schedule in `state` as if evaluated `ago_secs` ago.
    pub fn set_state(&self, id: i64, state: ReportState, ago_secs: i64) {
        let mut schedule = self.schedule(id);
        schedule.last_state = Some(state);
        schedule.last_eval_at = Some(Utc::now() - Duration::seconds(ago_secs));
        self.save(&schedule);
    }
}

// ─── Fixtures ────────────────────────────────────────────────

pub fn owner() -> User {
    User { id: 1, username: "alice".into(), email: "alice@example.com".into() }
}

pub fn chart_target() -> ReportTarget {
    ReportTarget::Chart(ChartRef {
        id: 11,
        slice_name: "Revenue".into(),
        digest: "chart-digest".into(),
        query_context: Some(json!({"queries": [{}], "form_data": {"slice_id": 11}})),
    })
}

pub fn chart_report(id: i64, format: ReportFormat) -> ReportSchedule {
    let mut s = ReportSchedule::new(id, "Weekly", ReportScheduleType::Report, chart_target(), format);
    s.owners = vec![owner()];
    s.created_by = Some(owner());
    s.recipients = vec![Recipient::email("team@example.com")];
    s
}

pub fn alert(id: i64) -> ReportSchedule {
    let mut s = ReportSchedule::new(id, "CPU high", ReportScheduleType::Alert, chart_target(), ReportFormat::Visualization);
    s.owners = vec![owner()];
    s.created_by = Some(owner());
    s.recipients = vec![Recipient::email("oncall@example.com")];
    s
}

fn slice(id: i64, name: &str) -> SliceSummary {
    SliceSummary {
        slice_id: id,
        slice_name: name.into(),
        query_context: Some(
            json!({
                "queries": [{"time_range": "No filter", "columns": ["region"]}],
                "form_data": {"slice_id": id, "time_range": "No filter"},
            })
            .to_string(),
        ),
    }
}

/// Three charts and a markdown block spread across rows and tabs; the
/// expected traversal order is Alpha, notes, Beta, Gamma.
pub fn dashboard_target() -> ReportTarget {
    let position = json!({
        "DASHBOARD_VERSION_KEY": "v2",
        "ROOT_ID": {"type": "ROOT", "children": ["GRID_ID"]},
        "GRID_ID": {"type": "GRID", "children": ["HEADER-1", "ROW-1", "TABS-1"]},
        "HEADER-1": {"type": "HEADER", "children": [], "meta": {"text": "Ops"}},
        "ROW-1": {"type": "ROW", "children": ["CHART-1", "MARKDOWN-1"]},
        "TABS-1": {"type": "TABS", "children": ["TAB-1", "TAB-2"]},
        "TAB-1": {"type": "TAB", "children": ["ROW-2"]},
        "ROW-2": {"type": "ROW", "children": ["COLUMN-1"]},
        "COLUMN-1": {"type": "COLUMN", "children": ["CHART-2"]},
        "TAB-2": {"type": "TAB", "children": ["DIVIDER-1", "CHART-3"]},
        "DIVIDER-1": {"type": "DIVIDER", "children": []},
        "CHART-1": {"type": "CHART", "children": [], "meta": {"chartId": 21, "sliceName": "Alpha", "width": 6, "height": 50}},
        "CHART-2": {"type": "CHART", "children": [], "meta": {"chartId": 22, "sliceName": "Beta", "width": 12, "height": 40}},
        "CHART-3": {"type": "CHART", "children": [], "meta": {"chartId": 23, "sliceName": "Gamma", "width": 4, "height": 30}},
        "MARKDOWN-1": {"type": "MARKDOWN", "children": [], "meta": {"code": "Weekly notes"}},
    });
    let filters = json!([
        {"id": "NATIVE_FILTER-1", "name": "Period", "filterType": "filter_time",
         "defaultDataMask": {"filterState": {"value": "Last quarter"}}, "extraFormData": {"time_range": "Last quarter"}},
        {"id": "NATIVE_FILTER-2", "name": "Region", "filterType": "filter_select",
         "defaultDataMask": {"filterState": {"value": ["north", "south"]}}, "extraFormData": {}},
    ]);
    ReportTarget::Dashboard(DashboardRef {
        id: 7,
        dashboard_title: "Operations".into(),
        digest: "dash-digest".into(),
        position_json: position.to_string(),
        slices: vec![slice(21, "Alpha"), slice(22, "Beta"), slice(23, "Gamma")],
        native_filter_configuration: filters,
    })
}

pub fn dashboard_report(id: i64, format: ReportFormat) -> ReportSchedule {
    let mut s = ReportSchedule::new(id, "Daily", ReportScheduleType::Report, dashboard_target(), format);
    s.owners = vec![owner()];
    s.created_by = Some(owner());
    s.recipients = vec![Recipient::email("team@example.com")];
    s
}
