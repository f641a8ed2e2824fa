//! Table documents: HTML assembly plus the engines that turn HTML into
//! deliverable bytes.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

use vizalert_core::config::DocumentConfig;
use vizalert_core::error::{Result, VizAlertError};
use vizalert_core::traits::{DocumentOptions, DocumentRenderer};
use vizalert_core::types::Table;

pub const DOCUMENT_CSS: &str = "<style>\n    table {\n        border-spacing: 0px;\n        font-size: small;\n    }\n    th, td {\n        padding: 2px 6px;\n    }\n</style>\n";

/// Label rendered for a filter without an active value.
pub const NO_FILTER: &str = "No filter";

/// One active dashboard filter as rendered in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterLine {
    pub name: String,
    pub value: String,
}

impl FilterLine {
    pub fn new(name: &str, value: &serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            value: format_filter_value(value),
        }
    }
}

/// A block of a composite dashboard document, in layout order.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSection {
    Chart { name: String, table: Option<Table> },
    Markdown { code: String },
}

/// Human-readable filter value; empty values read as [`NO_FILTER`].
pub fn format_filter_value(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(cell_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        NO_FILTER.to_string()
    } else {
        text
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render a table as an HTML `<table>` without an index column.
pub fn table_to_html(table: &Table) -> String {
    let mut html = String::from("<table border=\"1\" class=\"dataframe\">\n<thead>\n<tr style=\"text-align: left;\">");
    for col in &table.columns {
        html.push_str(&format!("<th>{}</th>", escape_html(col)));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", escape_html(&cell_text(cell))));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

/// A single table document with an optional title.
pub fn table_document(table: &Table, title: Option<&str>) -> String {
    let title_header = title
        .map(|t| format!("<h2>{}</h2>\n", escape_html(t)))
        .unwrap_or_default();
    format!("{DOCUMENT_CSS}{title_header}{}", table_to_html(table))
}

/// Composite dashboard document: title block, one line per filter, then the
/// sections in the order given.
pub fn dashboard_document(title: &str, filters: &[FilterLine], sections: &[DocumentSection]) -> String {
    let mut html = String::from(DOCUMENT_CSS);
    html.push_str(&format!("<h2>{}</h2>\n", escape_html(title)));

    html.push_str("<div class=\"filters\">\n");
    for filter in filters {
        html.push_str(&format!(
            "<p class=\"filter\">{}: {}</p>\n",
            escape_html(&filter.name),
            escape_html(&filter.value)
        ));
    }
    html.push_str("</div>\n");

    for section in sections {
        match section {
            DocumentSection::Chart { name, table } => {
                html.push_str("<section class=\"chart\">\n");
                html.push_str(&format!("<h3>{}</h3>\n", escape_html(name)));
                match table {
                    Some(table) => html.push_str(&table_to_html(table)),
                    None => html.push_str("<p class=\"no-data\">No data</p>\n"),
                }
                html.push_str("</section>\n");
            }
            DocumentSection::Markdown { code } => {
                html.push_str(&format!(
                    "<div class=\"markdown\"><pre>{}</pre></div>\n",
                    escape_html(code)
                ));
            }
        }
    }
    html
}

/// Emits the HTML unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlDocumentRenderer;

#[async_trait]
impl DocumentRenderer for HtmlDocumentRenderer {
    async fn render(&self, html: &str, _options: &DocumentOptions) -> Result<Vec<u8>> {
        Ok(html.as_bytes().to_vec())
    }
}

/// Renders PDF by piping HTML through `wkhtmltopdf`.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfRenderer {
    binary: String,
}

impl WkhtmltopdfRenderer {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl DocumentRenderer for WkhtmltopdfRenderer {
    async fn render(&self, html: &str, options: &DocumentOptions) -> Result<Vec<u8>> {
        let mut child = tokio::process::Command::new(&self.binary)
            .args([
                "--quiet",
                "--encoding",
                "utf-8",
                "--page-size",
                &options.page_size,
                "--orientation",
                &options.orientation,
                "-",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VizAlertError::Render(format!("Failed to start {}: {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(html.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(VizAlertError::Render(format!(
                "wkhtmltopdf exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(output.stdout)
    }
}

/// Build the configured document engine.
pub fn renderer_from_config(config: &DocumentConfig) -> Box<dyn DocumentRenderer> {
    match config.engine.as_str() {
        "html" => Box::new(HtmlDocumentRenderer),
        _ => Box::new(WkhtmltopdfRenderer::new(&config.wkhtmltopdf_path)),
    }
}

/// Document options from config.
pub fn options_from_config(config: &DocumentConfig) -> DocumentOptions {
    DocumentOptions {
        page_size: config.page_size.clone(),
        orientation: config.orientation.clone(),
    }
}
