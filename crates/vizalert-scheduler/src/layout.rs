//! Dashboard layout tree: parsing `position_json`, native filters, and the
//! depth-first walk that turns a layout into document sections.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;

use vizalert_core::VizAlertError;
use vizalert_core::traits::QueryExecutor;
use vizalert_core::types::{DashboardRef, ExecutionContext, QueryContext, Table};
use vizalert_render::document::{DocumentSection, FilterLine};

use crate::error::{ReportScheduleError, Result};

pub const ROOT_ID: &str = "ROOT_ID";
pub const TIME_FILTER: &str = "filter_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Root,
    Grid,
    Row,
    Column,
    Tabs,
    Tab,
    Header,
    Divider,
    Chart,
    Markdown,
    Other,
}

impl NodeType {
    fn parse(raw: &str) -> Self {
        match raw {
            "ROOT" => Self::Root,
            "GRID" => Self::Grid,
            "ROW" => Self::Row,
            "COLUMN" => Self::Column,
            "TABS" => Self::Tabs,
            "TAB" => Self::Tab,
            "HEADER" => Self::Header,
            "DIVIDER" => Self::Divider,
            "CHART" => Self::Chart,
            "MARKDOWN" => Self::Markdown,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    meta: serde_json::Value,
}

/// Position of a chart on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartMeta {
    pub chart_id: i64,
    pub slice_name: Option<String>,
    pub uuid: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutNode {
    Chart(ChartMeta),
    Markdown { code: String, width: Option<i64>, height: Option<i64> },
    Container { node_type: NodeType, children: Vec<String> },
}

impl LayoutNode {
    fn from_raw(raw: RawNode) -> Option<Self> {
        let meta = &raw.meta;
        match NodeType::parse(&raw.node_type) {
            NodeType::Chart => Some(Self::Chart(ChartMeta {
                chart_id: meta["chartId"].as_i64()?,
                slice_name: meta["sliceNameOverride"]
                    .as_str()
                    .or_else(|| meta["sliceName"].as_str())
                    .map(str::to_string),
                uuid: meta["uuid"].as_str().map(str::to_string),
                width: meta["width"].as_i64(),
                height: meta["height"].as_i64(),
            })),
            NodeType::Markdown => Some(Self::Markdown {
                code: meta["code"].as_str().unwrap_or_default().to_string(),
                width: meta["width"].as_i64(),
                height: meta["height"].as_i64(),
            }),
            node_type => Some(Self::Container { node_type, children: raw.children }),
        }
    }
}

/// A leaf reached by the walk, in layout order.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutItem {
    Chart(ChartMeta),
    Markdown { code: String, width: Option<i64>, height: Option<i64> },
}

#[derive(Debug, Clone, Default)]
pub struct DashboardLayout {
    nodes: HashMap<String, LayoutNode>,
}

impl DashboardLayout {
    /// Parse `position_json`. Non-object entries (version markers) and
    /// malformed nodes are ignored.
    pub fn parse(position_json: &str) -> Result<Self> {
        if position_json.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(position_json).map_err(VizAlertError::from)?;
        let nodes = raw
            .into_iter()
            .filter(|(_, v)| v.is_object())
            .filter_map(|(id, v)| {
                let node = serde_json::from_value::<RawNode>(v).ok()?;
                LayoutNode::from_raw(node).map(|n| (id, n))
            })
            .collect();
        Ok(Self { nodes })
    }

    /// Depth-first pre-order walk from `ROOT_ID`. Children are visited in
    /// their listed order; a node reached twice fails with `LayoutCycle`.
    pub fn walk(&self) -> Result<Vec<LayoutItem>> {
        let mut items = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![ROOT_ID];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(ReportScheduleError::LayoutCycle(id.to_string()));
            }
            let Some(node) = self.nodes.get(id) else {
                tracing::debug!("Layout references unknown node {id}");
                continue;
            };
            match node {
                LayoutNode::Chart(meta) => items.push(LayoutItem::Chart(meta.clone())),
                LayoutNode::Markdown { code, width, height } => items.push(LayoutItem::Markdown {
                    code: code.clone(),
                    width: *width,
                    height: *height,
                }),
                LayoutNode::Container { children, .. } => {
                    stack.extend(children.iter().rev().map(String::as_str));
                }
            }
        }
        Ok(items)
    }
}

/// A native dashboard filter and its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFilter {
    pub id: String,
    pub name: String,
    pub filter_type: String,
    pub value: serde_json::Value,
    pub extra_form_data: serde_json::Value,
}

impl NativeFilter {
    /// Time range value of an active time filter.
    pub fn time_range(&self) -> Option<&str> {
        if self.filter_type != TIME_FILTER {
            return None;
        }
        self.value.as_str().filter(|v| !v.is_empty())
    }

    pub fn line(&self) -> FilterLine {
        FilterLine::new(&self.name, &self.value)
    }
}

/// Filters from `native_filter_configuration`.
pub fn native_filters(config: &serde_json::Value) -> Vec<NativeFilter> {
    config
        .as_array()
        .map(|filters| {
            filters
                .iter()
                .map(|f| NativeFilter {
                    id: f["id"].as_str().unwrap_or_default().to_string(),
                    name: f["name"].as_str().unwrap_or_default().to_string(),
                    filter_type: f["filterType"].as_str().unwrap_or_default().to_string(),
                    value: f["defaultDataMask"]["filterState"]["value"].clone(),
                    extra_form_data: f["extraFormData"].clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Substitute active time filters into every query that has a time range,
/// and into the form data.
pub fn apply_time_filters(query: &mut QueryContext, filters: &[NativeFilter]) {
    for time_range in filters.iter().filter_map(NativeFilter::time_range) {
        let value = serde_json::Value::String(time_range.to_string());
        if let Some(queries) = query.0.get_mut("queries").and_then(|q| q.as_array_mut()) {
            for q in queries.iter_mut().filter_map(|q| q.as_object_mut()) {
                if q.contains_key("time_range") {
                    q.insert("time_range".into(), value.clone());
                }
            }
        }
        if let Some(form_data) = query.0.get_mut("form_data").and_then(|f| f.as_object_mut()) {
            form_data.insert("time_range".into(), value);
        }
    }
}

/// Rows of one dashboard chart, run from its saved query context.
async fn chart_table(
    queries: &dyn QueryExecutor,
    raw_query_context: &str,
    filters: &[NativeFilter],
    ctx: &ExecutionContext,
    deadline: Instant,
) -> Result<Option<Table>> {
    let mut query = match QueryContext::parse(raw_query_context) {
        Ok(q) => q,
        Err(e) => {
            tracing::warn!("⚠️ Unreadable query context: {e}");
            return Ok(None);
        }
    };
    apply_time_filters(&mut query, filters);
    let query = query.with_result_format("json");

    let outcome = tokio::time::timeout_at(deadline, queries.run(&query, true, ctx))
        .await
        .map_err(|_| ReportScheduleError::PdfTimeout)?;
    match outcome {
        Ok(table) => Ok(Some(table)),
        Err(VizAlertError::CacheLoad(e)) => {
            tracing::error!("❌ Chart data could not be loaded from cache: {e}");
            Ok(None)
        }
        Err(e) => {
            tracing::error!("❌ Chart query failed: {e}");
            Ok(None)
        }
    }
}

/// Walk the dashboard layout, executing each chart's query. Charts whose
/// query fails render without a table.
pub async fn collect_sections(
    dashboard: &DashboardRef,
    filters: &[NativeFilter],
    queries: &dyn QueryExecutor,
    ctx: &ExecutionContext,
    deadline: Instant,
) -> Result<Vec<DocumentSection>> {
    let layout = DashboardLayout::parse(&dashboard.position_json)?;
    let mut sections = Vec::new();

    for item in layout.walk()? {
        match item {
            LayoutItem::Chart(meta) => {
                let slice = dashboard.slices.iter().find(|s| s.slice_id == meta.chart_id);
                let name = meta
                    .slice_name
                    .clone()
                    .or_else(|| slice.map(|s| s.slice_name.clone()))
                    .unwrap_or_else(|| format!("Chart {}", meta.chart_id));
                let table = match slice.and_then(|s| s.query_context.as_deref()) {
                    Some(raw) => chart_table(queries, raw, filters, ctx, deadline).await?,
                    None => {
                        tracing::warn!("⚠️ Chart {} has no saved query context", meta.chart_id);
                        None
                    }
                };
                sections.push(DocumentSection::Chart { name, table });
            }
            LayoutItem::Markdown { code, .. } => sections.push(DocumentSection::Markdown { code }),
        }
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn position() -> String {
        json!({
            "DASHBOARD_VERSION_KEY": "v2",
            "ROOT_ID": {"type": "ROOT", "id": "ROOT_ID", "children": ["GRID_ID"]},
            "GRID_ID": {"type": "GRID", "id": "GRID_ID", "children": ["ROW-1", "ROW-2"]},
            "ROW-1": {"type": "ROW", "children": ["CHART-a", "MARKDOWN-m"]},
            "ROW-2": {"type": "ROW", "children": ["TABS-1"]},
            "TABS-1": {"type": "TABS", "children": ["TAB-1"]},
            "TAB-1": {"type": "TAB", "children": ["CHART-b"]},
            "CHART-a": {"type": "CHART", "children": [], "meta": {"chartId": 1, "sliceName": "Alpha", "width": 4, "height": 50}},
            "CHART-b": {"type": "CHART", "children": [], "meta": {"chartId": 2, "sliceName": "Beta", "sliceNameOverride": "Beta!"}},
            "MARKDOWN-m": {"type": "MARKDOWN", "children": [], "meta": {"code": "# hi"}},
        })
        .to_string()
    }

    #[test]
    fn test_walk_order() {
        let items = DashboardLayout::parse(&position()).unwrap().walk().unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], LayoutItem::Chart(m) if m.chart_id == 1 && m.width == Some(4)));
        assert!(matches!(&items[1], LayoutItem::Markdown { code, .. } if code == "# hi"));
        assert!(matches!(&items[2], LayoutItem::Chart(m) if m.slice_name.as_deref() == Some("Beta!")));
    }

    #[test]
    fn test_cycle_detected() {
        let cyclic = json!({
            "ROOT_ID": {"type": "ROOT", "children": ["ROW-1"]},
            "ROW-1": {"type": "ROW", "children": ["ROW-2"]},
            "ROW-2": {"type": "ROW", "children": ["ROW-1"]},
        })
        .to_string();
        let err = DashboardLayout::parse(&cyclic).unwrap().walk().unwrap_err();
        assert!(matches!(err, ReportScheduleError::LayoutCycle(id) if id == "ROW-1"));
    }

    #[test]
    fn test_empty_layout() {
        assert!(DashboardLayout::parse("").unwrap().walk().unwrap().is_empty());
        assert!(DashboardLayout::parse("{}").unwrap().walk().unwrap().is_empty());
    }

    #[test]
    fn test_native_filters_and_time_substitution() {
        let config = json!([
            {"id": "F1", "name": "Time", "filterType": "filter_time",
             "defaultDataMask": {"filterState": {"value": "Last week"}}, "extraFormData": {}},
            {"id": "F2", "name": "Region", "filterType": "filter_select",
             "defaultDataMask": {"filterState": {"value": ["north"]}}},
            {"id": "F3", "name": "Empty time", "filterType": "filter_time", "defaultDataMask": {}},
        ]);
        let filters = native_filters(&config);
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].time_range(), Some("Last week"));
        assert_eq!(filters[1].time_range(), None);
        assert_eq!(filters[2].time_range(), None);
        assert_eq!(filters[2].line().value, "No filter");

        let mut qc = QueryContext(json!({
            "queries": [{"time_range": "No filter"}, {"columns": []}],
            "form_data": {"viz_type": "table"},
        }));
        apply_time_filters(&mut qc, &filters);
        assert_eq!(qc.0["queries"][0]["time_range"], "Last week");
        assert!(qc.0["queries"][1].get("time_range").is_none());
        assert_eq!(qc.0["form_data"]["time_range"], "Last week");
    }
}
