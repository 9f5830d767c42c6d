//! Qianfan AI search (`baidu_search_v2`) backend.

use super::http::{check_status, map_send_error};
use super::{Recency, SearchHit, SearchProvider, SearchRequest, SearchResponse};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use sidekick_rs_config::{BaiduSearchConfig, SearchEngineKind};
use sidekick_rs_protocol::ToolError;
use std::time::Duration;

/// Most sites the engine accepts in one site filter.
pub const MAX_SITES: usize = 20;

/// Client for the Qianfan web search endpoint.
#[derive(Debug, Clone)]
pub struct BaiduSearch {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
}

impl BaiduSearch {
    /// Create a client for an explicit endpoint and key.
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            api_key_env: "BAIDU_SEARCH_API_KEY".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create a client from configuration, resolving the key from the environment.
    pub fn from_config(config: &BaiduSearchConfig, client: reqwest::Client) -> Self {
        let mut search = Self::new(client, config.api_url.clone(), config.resolve_api_key());
        search.api_key_env = config.api_key_env.clone();
        search.timeout = Duration::from_secs(config.timeout_secs);
        search
    }

    /// Request body for a search.
    pub fn request_body(request: &SearchRequest) -> Value {
        let mut body = json!({
            "messages": [{ "content": request.query, "role": "user" }],
            "search_source": "baidu_search_v2",
            "resource_type_filter": [{ "type": "web", "top_k": request.limit }],
        });
        if let Some(recency) = request.recency {
            body["search_recency_filter"] = json!(recency_filter(recency));
        }
        if !request.sites.is_empty() {
            let sites: Vec<&String> = request.sites.iter().take(MAX_SITES).collect();
            body["search_filter"] = json!({ "match": { "site": sites } });
        }
        body
    }
}

fn recency_filter(recency: Recency) -> &'static str {
    match recency {
        Recency::Day => "day",
        Recency::Week => "week",
        Recency::Month => "month",
        // No half-year window upstream; the year window is the closest superset.
        Recency::HalfYear | Recency::Year => "year",
    }
}

#[derive(Debug, Deserialize)]
struct BaiduResponse {
    #[serde(default)]
    references: Vec<BaiduReference>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaiduReference {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    website: String,
}

impl From<BaiduReference> for SearchHit {
    fn from(item: BaiduReference) -> Self {
        let snippet = if item.snippet.trim().is_empty() {
            item.content
        } else {
            item.snippet
        };
        SearchHit {
            title: item.title,
            url: item.url,
            snippet,
            site: item.website,
            date: item.date.filter(|date| !date.is_empty()),
        }
    }
}

#[async_trait]
impl SearchProvider for BaiduSearch {
    fn engine(&self) -> SearchEngineKind {
        SearchEngineKind::Baidu
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::Unauthorized(format!(
                "baidu search api key not configured (set {})",
                self.api_key_env
            )));
        };
        let url = format!("{}/v2/ai_search/web_search", self.api_url);
        debug!(
            "baidu search request (recency={:?}, sites={})",
            request.recency,
            request.sites.len()
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|err| map_send_error("baidu", err))?;
        let response = check_status("baidu", response).await?;
        let parsed: BaiduResponse = response.json().await.map_err(|err| {
            ToolError::ExecutionFailed(format!("baidu search response unreadable: {err}"))
        })?;
        if parsed.references.is_empty()
            && let Some(code) = parsed.code
        {
            return Err(ToolError::ExecutionFailed(format!(
                "baidu search error {code}: {}",
                parsed.message.unwrap_or_default()
            )));
        }
        let results: Vec<SearchHit> = parsed
            .references
            .into_iter()
            .take(request.limit)
            .map(SearchHit::from)
            .collect();
        Ok(SearchResponse::new(
            SearchEngineKind::Baidu,
            &request.query,
            results,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::BaiduSearch;
    use crate::search::{Recency, SearchRequest};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_body_carries_filters() {
        let mut request = SearchRequest::new("上海天气");
        request.limit = 3;
        request.recency = Some(Recency::HalfYear);
        request.sites = (0..25).map(|idx| format!("site{idx}.cn")).collect();

        let body = BaiduSearch::request_body(&request);
        assert_eq!(body["messages"], json!([{ "content": "上海天气", "role": "user" }]));
        assert_eq!(body["search_source"], "baidu_search_v2");
        assert_eq!(body["resource_type_filter"], json!([{ "type": "web", "top_k": 3 }]));
        assert_eq!(body["search_recency_filter"], "year");
        assert_eq!(
            body["search_filter"]["match"]["site"]
                .as_array()
                .expect("sites")
                .len(),
            20
        );
    }

    #[test]
    fn request_body_omits_unset_filters() {
        let body = BaiduSearch::request_body(&SearchRequest::new("rust"));
        assert!(body.get("search_recency_filter").is_none());
        assert!(body.get("search_filter").is_none());
    }
}
