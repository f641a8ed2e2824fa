//! URL resolution and dashboard permalinks.

use async_trait::async_trait;

use vizalert_core::error::{Result, VizAlertError};
use vizalert_core::traits::{PermalinkStore, Route, UrlResolver};
use vizalert_core::types::Identity;

use crate::query::ApiClient;

/// Resolves routes against a fixed base URL. Path parameters (`pk`,
/// `dashboard_id_or_slug`, `key`) are substituted; every other parameter is
/// appended as an encoded query pair.
#[derive(Debug, Clone)]
pub struct BaseUrlResolver {
    base_url: String,
}

impl BaseUrlResolver {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn take<'a>(params: &'a [(&str, String)], name: &str) -> &'a str {
    params
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

fn path_params(route: Route) -> &'static [&'static str] {
    match route {
        Route::Explore => &[],
        Route::ChartData => &["pk"],
        Route::Dashboard => &["dashboard_id_or_slug"],
        Route::DashboardPermalink => &["key"],
    }
}

impl UrlResolver for BaseUrlResolver {
    fn url_for(&self, route: Route, params: &[(&str, String)]) -> String {
        let path = match route {
            Route::Explore => "/explore/".to_string(),
            Route::ChartData => format!("/api/v1/chart/{}/data/", take(params, "pk")),
            Route::Dashboard => format!("/superset/dashboard/{}/", take(params, "dashboard_id_or_slug")),
            Route::DashboardPermalink => format!("/superset/dashboard/p/{}/", take(params, "key")),
        };
        let reserved = path_params(route);
        let raw = format!("{}{}", self.base_url, path);
        let query: Vec<(&str, &str)> = params
            .iter()
            .filter(|(k, _)| !reserved.iter().any(|p| p == k))
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        if query.is_empty() {
            return raw;
        }
        match reqwest::Url::parse(&raw) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(query);
                url.to_string()
            }
            Err(_) => {
                let qs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{raw}?{}", qs.join("&"))
            }
        }
    }
}

/// Creates dashboard permalinks through the BI application API.
pub struct HttpPermalinkStore {
    api: ApiClient,
    identity: Identity,
}

impl HttpPermalinkStore {
    pub fn new(api: ApiClient, identity: Identity) -> Self {
        Self { api, identity }
    }
}

#[async_trait]
impl PermalinkStore for HttpPermalinkStore {
    async fn create_dashboard_permalink(&self, dashboard_id: i64, state: &serde_json::Value) -> Result<String> {
        let path = format!("/api/v1/dashboard/{dashboard_id}/permalink");
        let (status, reply) = self.api.post_json(&path, state, &self.identity).await?;
        if !status.is_success() {
            return Err(VizAlertError::Render(format!("Permalink creation failed: {status}")));
        }
        reply["key"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VizAlertError::Render("Permalink response has no key".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_url() {
        let urls = BaseUrlResolver::new("http://bi.local/");
        let url = urls.url_for(
            Route::Dashboard,
            &[("dashboard_id_or_slug", "7".into()), ("force", "false".into())],
        );
        assert_eq!(url, "http://bi.local/superset/dashboard/7/?force=false");
    }

    #[test]
    fn test_explore_url_encodes_form_data() {
        let urls = BaseUrlResolver::new("http://bi.local");
        let url = urls.url_for(Route::Explore, &[("form_data", r#"{"slice_id": 3}"#.into())]);
        assert!(url.starts_with("http://bi.local/explore/?form_data="));
        assert!(!url.contains('{'));
    }

    #[test]
    fn test_permalink_url_has_no_query() {
        let urls = BaseUrlResolver::new("http://bi.local");
        assert_eq!(
            urls.url_for(Route::DashboardPermalink, &[("key", "abc".into())]),
            "http://bi.local/superset/dashboard/p/abc/"
        );
    }
}
