//! HTTP clients for the BI application's data APIs.

use async_trait::async_trait;
use std::time::Duration;

use vizalert_core::config::RenderConfig;
use vizalert_core::error::{Result, VizAlertError};
use vizalert_core::traits::{QueryExecutor, SqlRunner};
use vizalert_core::types::{ExecutionContext, Identity, QueryContext, Table};

/// Header carrying the executor username on API calls.
pub const RUN_AS_HEADER: &str = "X-Run-As";

/// Authenticated JSON client for the BI application API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` acting as `identity`, returning the JSON reply.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        identity: &Identity,
    ) -> Result<(reqwest::StatusCode, serde_json::Value)> {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(RUN_AS_HEADER, identity.username.as_str())
            .json(body)
            .timeout(self.timeout);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| VizAlertError::Query(format!("POST {path} failed: {e}")))?;
        let status = resp.status();
        let json = resp.json::<serde_json::Value>().await.unwrap_or_default();
        Ok((status, json))
    }

    /// GET an absolute URL acting as `identity`.
    pub async fn get_json(&self, url: &str, identity: &Identity) -> Result<(reqwest::StatusCode, serde_json::Value)> {
        let mut req = self
            .client
            .get(url)
            .header(RUN_AS_HEADER, identity.username.as_str())
            .timeout(self.timeout);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| VizAlertError::Query(format!("GET {url} failed: {e}")))?;
        let status = resp.status();
        let json = resp.json::<serde_json::Value>().await.unwrap_or_default();
        Ok((status, json))
    }
}

/// First entry of a chart data `result` list.
fn first_result(body: &serde_json::Value) -> Result<Table> {
    let first = body["result"]
        .as_array()
        .and_then(|results| results.first())
        .ok_or_else(|| VizAlertError::Query("chart data response has no result".into()))?;
    table_from_payload(first)
}

fn failure(status: reqwest::StatusCode, body: &serde_json::Value) -> VizAlertError {
    let message = body["message"].as_str().unwrap_or("query failed").to_string();
    if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY && message.contains("cache") {
        return VizAlertError::CacheLoad(message);
    }
    VizAlertError::Query(format!("{status}: {message}"))
}

/// Convert a `{colnames, data: [records]}` payload into a table.
pub fn table_from_payload(payload: &serde_json::Value) -> Result<Table> {
    let columns: Vec<String> = match payload.get("colnames").or_else(|| payload.get("columns")) {
        Some(serde_json::Value::Array(cols)) => cols
            .iter()
            .map(|c| match c {
                serde_json::Value::String(s) => s.clone(),
                other => other["name"].as_str().unwrap_or_default().to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };
    let records = payload["data"]
        .as_array()
        .ok_or_else(|| VizAlertError::InvalidData("payload has no data array".into()))?;
    Ok(Table::from_records(columns, records))
}

/// Runs chart query contexts through the chart data API.
pub struct HttpQueryExecutor {
    api: ApiClient,
}

impl HttpQueryExecutor {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    async fn run(&self, query: &QueryContext, force_cached: bool, ctx: &ExecutionContext) -> Result<Table> {
        let path = format!("/api/v1/chart/data?force={}", !force_cached);
        let (status, body) = self.api.post_json(&path, &query.0, &ctx.executor).await?;
        if !status.is_success() {
            return Err(failure(status, &body));
        }
        first_result(&body)
    }

    async fn chart_data(&self, url: &str, ctx: &ExecutionContext) -> Result<Table> {
        let (status, body) = self.api.get_json(url, &ctx.executor).await?;
        if !status.is_success() {
            return Err(failure(status, &body));
        }
        first_result(&body)
    }
}

/// Runs alert SQL through the SQL Lab execute API.
pub struct HttpSqlRunner {
    api: ApiClient,
}

impl HttpSqlRunner {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SqlRunner for HttpSqlRunner {
    async fn execute(&self, database_id: i64, sql: &str, limit: usize, ctx: &ExecutionContext) -> Result<Table> {
        let body = serde_json::json!({
            "database_id": database_id,
            "sql": sql,
            "queryLimit": limit,
            "runAsync": false,
            "select_as_cta": false,
            "client_id": ctx.execution_id.simple().to_string()[..10].to_string(),
        });
        let (status, reply) = self.api.post_json("/api/v1/sqllab/execute/", &body, &ctx.executor).await?;
        if !status.is_success() {
            let message = reply["message"].as_str().unwrap_or("sql failed");
            return Err(VizAlertError::Query(format!("{status}: {message}")));
        }
        table_from_payload(&reply)
    }
}
