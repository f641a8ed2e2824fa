use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecutionContext, QueryContext, Table};

/// Runs chart query contexts against the query engine.
///
/// `force_cached` asks the engine to reuse cached results where possible.
/// Fails with `VizAlertError::CacheLoad` or `VizAlertError::Query`.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run(&self, query: &QueryContext, force_cached: bool, ctx: &ExecutionContext) -> Result<Table>;

    /// Fetch post-processed rows from a chart data URL, which runs the
    /// query context saved with the chart.
    async fn chart_data(&self, url: &str, ctx: &ExecutionContext) -> Result<Table>;
}

/// Runs raw SQL, used by alert trigger queries.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    async fn execute(&self, database_id: i64, sql: &str, limit: usize, ctx: &ExecutionContext) -> Result<Table>;
}
