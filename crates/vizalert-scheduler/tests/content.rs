mod common;

use common::*;
use serde_json::json;

use vizalert_core::types::{ReportFormat, ReportState, ReportTarget};
use vizalert_scheduler::ReportScheduleError;
use vizalert_scheduler::content::{MISSING_CSV, MISSING_PDF, MISSING_SCREENSHOT, NO_QUERY_CONTEXT};

fn delivered(h: &Harness) -> vizalert_core::types::NotificationContent {
    let sent = h.notifications.sent_to("team@example.com");
    assert_eq!(sent.len(), 1, "expected exactly one delivery");
    sent[0].content.clone()
}

// ─── Charts ──────────────────────────────────────────────────

#[tokio::test]
async fn test_csv_report() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Data));

    h.execute(1).await.unwrap();

    let content = delivered(&h);
    let csv = String::from_utf8(content.data.unwrap()).unwrap();
    assert!(csv.starts_with("region,total"));
    assert!(csv.contains("north,10"));
    assert_eq!(content.data_format, Some(ReportFormat::Data));
    let data_url = h.queries.data_urls.lock().unwrap()[0].clone();
    assert!(data_url.starts_with("http://bi.local/api/v1/chart/11/data/?"));
    assert!(data_url.contains("format=json"));
}

#[tokio::test]
async fn test_empty_csv_is_missing_artifact() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Data));
    *h.queries.table.lock().unwrap() = vizalert_core::types::Table::new(Vec::new(), Vec::new());

    let outcome = h.execute(1).await;
    assert!(matches!(outcome, Err(ReportScheduleError::MissingArtifact(ref t)) if t == MISSING_CSV));
    assert_eq!(delivered(&h).text.as_deref(), Some(MISSING_CSV));
}

#[tokio::test]
async fn test_text_report_embeds_table() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Text));

    h.execute(1).await.unwrap();

    let content = delivered(&h);
    let table = content.embedded_data.unwrap();
    assert_eq!(table.columns, vec!["region", "total"]);
    assert_eq!(table.len(), 2);
    assert!(content.data.is_none());
}

#[tokio::test]
async fn test_chart_pdf_report() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Pdf));

    h.execute(1).await.unwrap();

    let content = delivered(&h);
    let html = String::from_utf8(content.data.unwrap()).unwrap();
    assert!(html.contains("<h2>Revenue</h2>"));
    assert!(html.contains("<td>north</td>"));
    assert_eq!(content.data_format, Some(ReportFormat::Pdf));
}

#[tokio::test]
async fn test_dashboard_pdf_for_chart_is_missing() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::DashboardPdf));

    let outcome = h.execute(1).await;
    assert!(matches!(outcome, Err(ReportScheduleError::MissingArtifact(ref t)) if t == MISSING_PDF));
    let content = delivered(&h);
    assert_eq!(content.payload_kinds(), 0);
    assert!(content.url.is_some());
}

#[tokio::test]
async fn test_missing_screenshot_delivers_error_text() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Visualization));
    *h.screenshots.empty.lock().unwrap() = true;

    let outcome = h.execute(1).await;
    assert!(matches!(outcome, Err(ReportScheduleError::MissingArtifact(_))));

    assert_eq!(delivered(&h).text.as_deref(), Some(MISSING_SCREENSHOT));
    assert_eq!(h.schedule(1).last_state, Some(ReportState::Error));
    assert_eq!(h.notifications.sent_to("alice@example.com").len(), 1);
}

#[tokio::test]
async fn test_zero_byte_screenshot_is_missing() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Visualization));
    *h.screenshots.zero_bytes.lock().unwrap() = true;

    let outcome = h.execute(1).await;
    assert!(matches!(outcome, Err(ReportScheduleError::MissingArtifact(ref t)) if t == MISSING_SCREENSHOT));

    let content = delivered(&h);
    assert!(content.screenshots.is_empty());
    assert_eq!(content.text.as_deref(), Some(MISSING_SCREENSHOT));
    assert_eq!(h.schedule(1).last_state, Some(ReportState::Error));
}

#[tokio::test]
async fn test_no_query_context_and_failed_render() {
    let h = Harness::new();
    let mut schedule = chart_report(1, ReportFormat::Data);
    if let ReportTarget::Chart(chart) = &mut schedule.target {
        chart.query_context = None;
    }
    h.save(&schedule);
    *h.screenshots.fail.lock().unwrap() = true;

    let outcome = h.execute(1).await;
    assert!(matches!(outcome, Err(ReportScheduleError::CsvFailed(ref m)) if m == NO_QUERY_CONTEXT));
    assert!(h.notifications.sent_to("team@example.com").is_empty());
    assert!(h.queries.data_urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_query_context_rendered_once() {
    let h = Harness::new();
    let mut schedule = chart_report(1, ReportFormat::Data);
    if let ReportTarget::Chart(chart) = &mut schedule.target {
        chart.query_context = None;
    }
    h.save(&schedule);

    h.execute(1).await.unwrap();

    assert_eq!(h.screenshots.calls.lock().unwrap().len(), 1);
    assert!(delivered(&h).data.is_some());
}

#[tokio::test]
async fn test_header_data() {
    let h = Harness::new();
    h.save(&chart_report(1, ReportFormat::Visualization));

    let (execution_id, outcome) = h.execute_tracked(1).await;
    outcome.unwrap();

    let header = delivered(&h).header_data;
    assert_eq!(header.chart_id, Some(11));
    assert_eq!(header.dashboard_id, None);
    assert_eq!(header.owners, vec![1]);
    assert_eq!(header.execution_id, execution_id);
}

// ─── Dashboards ──────────────────────────────────────────────

#[tokio::test]
async fn test_dashboard_document_follows_layout() {
    let h = Harness::new();
    h.save(&dashboard_report(1, ReportFormat::DashboardPdf));

    h.execute(1).await.unwrap();

    let content = delivered(&h);
    assert_eq!(content.name, "Daily: Operations");
    let html = String::from_utf8(content.data.unwrap()).unwrap();
    assert_eq!(html.matches("<section class=\"chart\">").count(), 3);
    assert_eq!(html.matches("<p class=\"filter\">").count(), 2);

    let alpha = html.find("Alpha").unwrap();
    let notes = html.find("Weekly notes").unwrap();
    let beta = html.find("Beta").unwrap();
    let gamma = html.find("Gamma").unwrap();
    assert!(alpha < notes && notes < beta && beta < gamma);

    let runs = h.queries.runs.lock().unwrap();
    assert_eq!(runs.len(), 3);
    for query in runs.iter() {
        assert_eq!(query.0["queries"][0]["time_range"], json!("Last quarter"));
        assert_eq!(query.0["form_data"]["time_range"], json!("Last quarter"));
    }
}

#[tokio::test]
async fn test_dashboard_chart_query_failure_keeps_section() {
    let h = Harness::new();
    h.save(&dashboard_report(1, ReportFormat::Pdf));
    h.queries.fail_charts.lock().unwrap().push(22);

    h.execute(1).await.unwrap();

    let html = String::from_utf8(delivered(&h).data.unwrap()).unwrap();
    assert_eq!(html.matches("<section class=\"chart\">").count(), 3);
    assert_eq!(html.matches("No data").count(), 1);
}

#[tokio::test]
async fn test_dashboard_csv_is_missing() {
    let h = Harness::new();
    h.save(&dashboard_report(1, ReportFormat::Data));

    let outcome = h.execute(1).await;
    assert!(matches!(outcome, Err(ReportScheduleError::MissingArtifact(ref t)) if t == MISSING_CSV));
    assert!(h.queries.runs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dashboard_text_has_no_payload() {
    let h = Harness::new();
    h.save(&dashboard_report(1, ReportFormat::Text));

    h.execute(1).await.unwrap();

    let content = delivered(&h);
    assert_eq!(content.payload_kinds(), 0);
    assert_eq!(content.url.as_deref(), Some("http://bi.local/superset/dashboard/7/?force=false"));
}

#[tokio::test]
async fn test_dashboard_state_uses_permalink() {
    let h = Harness::new();
    let mut schedule = dashboard_report(1, ReportFormat::Visualization);
    schedule.extra = json!({"dashboard": {"activeTabs": ["TAB-2"]}});
    h.save(&schedule);

    h.execute(1).await.unwrap();

    let content = delivered(&h);
    assert_eq!(content.url.as_deref(), Some("http://bi.local/superset/dashboard/p/perma-key/"));
    let shot_url = h.screenshots.calls.lock().unwrap()[0].clone();
    assert!(shot_url.starts_with("http://bi.local/superset/dashboard/p/perma-key/"));
}
