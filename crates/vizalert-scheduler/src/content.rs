//! Builds the notification content of one execution: screenshot, CSV,
//! embedded table or document, depending on the schedule's format.

use std::future::Future;

use tokio::time::Instant;

use vizalert_core::traits::Route;
use vizalert_core::types::{
    ChartRef, DashboardRef, ExecutionContext, HeaderData, NotificationContent, ReportFormat, ReportSchedule,
    ReportTarget, Table,
};
use vizalert_render::Screenshot;
use vizalert_render::document::{dashboard_document, table_document};
use vizalert_render::export::table_to_csv;

use crate::error::{ReportScheduleError, Result};
use crate::layout::{collect_sections, native_filters};
use crate::services::Services;

pub const MISSING_SCREENSHOT: &str = "Unexpected missing screenshot";
pub const MISSING_PDF: &str = "Unexpected missing PDF file";
pub const MISSING_CSV: &str = "Unexpected missing csv file";
pub const NO_QUERY_CONTEXT: &str = "Unable to fetch data because the chart has no query context saved, and an error \
                                    occurred when fetching it via a screenshot. Please try loading the chart and \
                                    saving it again.";

/// Run `fut` until the execution's soft deadline, mapping expiry to `on_timeout`.
pub async fn within_limit<F: Future>(deadline: Instant, on_timeout: ReportScheduleError, fut: F) -> Result<F::Output> {
    tokio::time::timeout_at(deadline, fut).await.map_err(|_| on_timeout)
}

/// What the fetched chart rows end up as; selects the error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataStage {
    Csv,
    DataFrame,
    Pdf,
}

impl DataStage {
    fn timeout(self) -> ReportScheduleError {
        match self {
            Self::Csv => ReportScheduleError::CsvTimeout,
            Self::DataFrame => ReportScheduleError::DataFrameTimeout,
            Self::Pdf => ReportScheduleError::PdfTimeout,
        }
    }

    fn failed(self, reason: impl std::fmt::Display) -> ReportScheduleError {
        match self {
            Self::Csv => ReportScheduleError::CsvFailed(format!("Failed generating csv {reason}")),
            Self::DataFrame => ReportScheduleError::DataFrameFailed(reason.to_string()),
            Self::Pdf => ReportScheduleError::PdfFailed(reason.to_string()),
        }
    }
}

pub struct ContentBuilder<'a> {
    services: &'a Services,
    schedule: &'a ReportSchedule,
    ctx: &'a ExecutionContext,
    deadline: Instant,
}

impl<'a> ContentBuilder<'a> {
    /// `deadline` is the soft time limit of the whole execution.
    pub fn new(
        services: &'a Services,
        schedule: &'a ReportSchedule,
        ctx: &'a ExecutionContext,
        deadline: Instant,
    ) -> Self {
        Self {
            services,
            schedule,
            ctx,
            deadline,
        }
    }

    pub fn header_data(&self) -> HeaderData {
        HeaderData {
            notification_type: self.schedule.schedule_type,
            notification_source: self.schedule.source(),
            notification_format: self.schedule.report_format,
            chart_id: self.schedule.chart().map(|c| c.id),
            dashboard_id: self.schedule.dashboard().map(|d| d.id),
            owners: self.schedule.owners.iter().map(|o| o.id).collect(),
            execution_id: self.ctx.execution_id,
        }
    }

    /// `"{schedule}: {chart or dashboard title}"`.
    pub fn name(&self) -> String {
        let title = match &self.schedule.target {
            ReportTarget::Chart(chart) => &chart.slice_name,
            ReportTarget::Dashboard(dashboard) => &dashboard.dashboard_title,
        };
        format!("{}: {}", self.schedule.name, title)
    }

    /// Page URL of the target, or the chart data URL when `result_format`
    /// is given. Dashboards with saved state get a fresh permalink.
    pub async fn url(&self, result_format: Option<&str>) -> Result<String> {
        let urls = &self.services.urls;
        let force = self.schedule.force_screenshot.to_string();
        match &self.schedule.target {
            ReportTarget::Chart(chart) => Ok(match result_format {
                Some(format) => urls.url_for(
                    Route::ChartData,
                    &[
                        ("pk", chart.id.to_string()),
                        ("format", format.to_string()),
                        ("type", "post_processed".to_string()),
                        ("force", force),
                    ],
                ),
                None => urls.url_for(
                    Route::Explore,
                    &[
                        ("form_data", serde_json::json!({ "slice_id": chart.id }).to_string()),
                        ("force", force),
                    ],
                ),
            }),
            ReportTarget::Dashboard(dashboard) => {
                if let Some(state) = self.schedule.dashboard_state() {
                    let key = self
                        .services
                        .permalinks
                        .create_dashboard_permalink(dashboard.id, state)
                        .await?;
                    return Ok(urls.url_for(Route::DashboardPermalink, &[("key", key)]));
                }
                Ok(urls.url_for(
                    Route::Dashboard,
                    &[("dashboard_id_or_slug", dashboard.id.to_string()), ("force", force)],
                ))
            }
        }
    }

    async fn screenshots(&self, url: &str) -> Result<Vec<Vec<u8>>> {
        let windows = &self.services.config.webdriver_window;
        let shot = match &self.schedule.target {
            ReportTarget::Chart(chart) => Screenshot::chart(url, &chart.digest, windows.slice),
            ReportTarget::Dashboard(dashboard) => Screenshot::dashboard(url, &dashboard.digest, windows.dashboard),
        };
        let image = within_limit(
            self.deadline,
            ReportScheduleError::ScreenshotTimeout,
            shot.capture(self.services.screenshots.as_ref(), &self.ctx.executor),
        )
        .await?
        .map_err(|e| ReportScheduleError::ScreenshotFailed(e.to_string()))?;
        Ok(image.filter(|bytes| !bytes.is_empty()).into_iter().collect())
    }

    /// A chart saved without a query context gets one persisted by the BI
    /// app when it is rendered once.
    async fn ensure_query_context(&self, chart: &ChartRef, url: &str) -> Result<()> {
        if chart.query_context.is_some() {
            return Ok(());
        }
        tracing::info!("🧩 Chart {} has no query context, rendering it once", chart.id);
        match self.screenshots(url).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("⚠️ Screenshot to save query context failed: {e}");
                Err(ReportScheduleError::CsvFailed(NO_QUERY_CONTEXT.to_string()))
            }
        }
    }

    async fn chart_rows(&self, chart: &ChartRef, page_url: &str, stage: DataStage) -> Result<Table> {
        self.ensure_query_context(chart, page_url).await?;
        let data_url = self.url(Some("json")).await?;
        within_limit(
            self.deadline,
            stage.timeout(),
            self.services.queries.chart_data(&data_url, self.ctx),
        )
        .await?
        .map_err(|e| stage.failed(e))
    }

    async fn render_document(&self, html: &str) -> Result<Vec<u8>> {
        within_limit(
            self.deadline,
            ReportScheduleError::PdfTimeout,
            self.services.documents.render(html, &self.services.document_options),
        )
        .await?
        .map_err(|e| ReportScheduleError::PdfFailed(e.to_string()))
    }

    async fn csv(&self, chart: &ChartRef, url: &str) -> Result<Vec<u8>> {
        let table = self.chart_rows(chart, url, DataStage::Csv).await?;
        if table.columns.is_empty() {
            return Ok(Vec::new());
        }
        table_to_csv(&table).map_err(|e| DataStage::Csv.failed(e))
    }

    async fn chart_document(&self, chart: &ChartRef, url: &str) -> Result<Vec<u8>> {
        let table = self.chart_rows(chart, url, DataStage::Pdf).await?;
        self.render_document(&table_document(&table, Some(&chart.slice_name))).await
    }

    /// Composite document: title, filters, then every chart and markdown
    /// block of the layout in order.
    async fn dashboard_document(&self, dashboard: &DashboardRef) -> Result<Vec<u8>> {
        let filters = native_filters(&dashboard.native_filter_configuration);
        let sections = collect_sections(
            dashboard,
            &filters,
            self.services.queries.as_ref(),
            self.ctx,
            self.deadline,
        )
        .await?;
        let lines: Vec<_> = filters.iter().map(|f| f.line()).collect();
        tracing::debug!(
            "📄 Dashboard {} document: {} filters, {} sections",
            dashboard.id,
            lines.len(),
            sections.len()
        );
        self.render_document(&dashboard_document(&dashboard.dashboard_title, &lines, &sections))
            .await
    }

    fn missing(&self, name: String, url: String, text: &str) -> NotificationContent {
        tracing::warn!("⚠️ {} for {} [{}]", text, self.schedule.name, self.ctx.execution_id);
        let mut content = NotificationContent::error(&name, text, self.header_data());
        content.url = Some(url);
        content
    }

    /// Build the content. A payload that renders empty yields content with
    /// only an error text.
    pub async fn build(&self) -> Result<NotificationContent> {
        let name = self.name();
        let url = self.url(None).await?;
        let mut content = NotificationContent {
            name: name.clone(),
            url: Some(url.clone()),
            screenshots: Vec::new(),
            description: self.schedule.description.clone(),
            data: None,
            data_format: None,
            embedded_data: None,
            text: None,
            header_data: self.header_data(),
        };

        let attach = !self.schedule.is_alert() || self.services.config.alerts_attach_reports;
        if !attach {
            return Ok(content);
        }

        let format = self.schedule.report_format;
        match (format, &self.schedule.target) {
            (ReportFormat::Visualization, _) => {
                let screenshots = self.screenshots(&url).await?;
                if screenshots.is_empty() {
                    return Ok(self.missing(name, url, MISSING_SCREENSHOT));
                }
                content.screenshots = screenshots;
            }
            (ReportFormat::Pdf, ReportTarget::Chart(chart)) => {
                let document = self.chart_document(chart, &url).await?;
                if document.is_empty() {
                    return Ok(self.missing(name, url, MISSING_PDF));
                }
                content.data = Some(document);
                content.data_format = Some(format);
            }
            (ReportFormat::Pdf | ReportFormat::DashboardPdf, ReportTarget::Dashboard(dashboard)) => {
                let document = self.dashboard_document(dashboard).await?;
                if document.is_empty() {
                    return Ok(self.missing(name, url, MISSING_PDF));
                }
                content.data = Some(document);
                content.data_format = Some(format);
            }
            (ReportFormat::DashboardPdf, ReportTarget::Chart(_)) => {
                return Ok(self.missing(name, url, MISSING_PDF));
            }
            (ReportFormat::Data, ReportTarget::Chart(chart)) => {
                let csv = self.csv(chart, &url).await?;
                if csv.is_empty() {
                    return Ok(self.missing(name, url, MISSING_CSV));
                }
                content.data = Some(csv);
                content.data_format = Some(format);
            }
            (ReportFormat::Data, ReportTarget::Dashboard(_)) => {
                return Ok(self.missing(name, url, MISSING_CSV));
            }
            (ReportFormat::Text, ReportTarget::Chart(chart)) => {
                content.embedded_data = Some(self.chart_rows(chart, &url, DataStage::DataFrame).await?);
            }
            (ReportFormat::Text, ReportTarget::Dashboard(_)) => {}
        }
        Ok(content)
    }
}
