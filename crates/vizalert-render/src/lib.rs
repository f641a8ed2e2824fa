//! # VizAlert Render
//!
//! Adapters that turn a chart or dashboard into deliverable bytes and the
//! HTTP clients used to reach the BI application on behalf of the executor.
//!
//! ```text
//! Screenshot ──▶ ScreenshotDriver (headless browser service)
//! Table ──▶ document::table_document ──▶ DocumentRenderer (wkhtmltopdf | html)
//! Dashboard sections ──▶ document::dashboard_document ──▶ DocumentRenderer
//! QueryContext ──▶ HttpQueryExecutor (chart data API)
//! ```

pub mod document;
pub mod export;
pub mod query;
pub mod screenshot;
pub mod urls;

pub use document::{DocumentSection, FilterLine, HtmlDocumentRenderer, WkhtmltopdfRenderer};
pub use query::{HttpQueryExecutor, HttpSqlRunner};
pub use screenshot::{RemoteScreenshotDriver, Screenshot, ScreenshotKind};
pub use urls::{BaseUrlResolver, HttpPermalinkStore};
