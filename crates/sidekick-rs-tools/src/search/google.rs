//! Google Custom Search JSON API backend.

use super::http::{check_status, map_send_error};
use super::{Recency, SearchHit, SearchProvider, SearchRequest, SearchResponse};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use sidekick_rs_config::{GoogleSearchConfig, SearchEngineKind};
use sidekick_rs_protocol::ToolError;
use std::time::Duration;

/// Most results one Custom Search request returns.
const MAX_NUM: usize = 10;

/// Client for the Custom Search endpoint.
#[derive(Debug, Clone)]
pub struct GoogleSearch {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    engine_id: Option<String>,
    timeout: Duration,
}

impl GoogleSearch {
    /// Create a client for an explicit endpoint, key, and engine id.
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: Option<String>,
        engine_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
            engine_id,
            timeout: Duration::from_secs(30),
        }
    }

    /// Create a client from configuration, resolving credentials from the environment.
    pub fn from_config(config: &GoogleSearchConfig, client: reqwest::Client) -> Self {
        let mut search = Self::new(
            client,
            config.api_url.clone(),
            config.resolve_api_key(),
            config.resolve_engine_id(),
        );
        search.timeout = Duration::from_secs(config.timeout_secs);
        search
    }

    /// Query parameters for a search, excluding credentials.
    ///
    /// A single site uses `siteSearch`; several sites are folded into the
    /// query as an `OR` group since the API takes only one `siteSearch`.
    pub fn query_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut query = request.query.clone();
        let mut params = Vec::new();
        match request.sites.as_slice() {
            [] => {}
            [site] => params.push(("siteSearch", site.clone())),
            sites => {
                let group: Vec<String> = sites.iter().map(|site| format!("site:{site}")).collect();
                query = format!("{query} ({})", group.join(" OR "));
            }
        }
        params.insert(0, ("q", query));
        params.insert(1, ("num", request.limit.clamp(1, MAX_NUM).to_string()));
        if let Some(recency) = request.recency {
            params.push(("dateRestrict", date_restrict(recency).to_string()));
        }
        params
    }
}

fn date_restrict(recency: Recency) -> &'static str {
    match recency {
        Recency::Day => "d1",
        Recency::Week => "w1",
        Recency::Month => "m1",
        Recency::HalfYear => "m6",
        Recency::Year => "y1",
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    display_link: String,
}

impl From<GoogleItem> for SearchHit {
    fn from(item: GoogleItem) -> Self {
        SearchHit {
            title: item.title,
            url: item.link,
            snippet: item.snippet.replace('\n', " "),
            site: item.display_link,
            date: None,
        }
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    fn engine(&self) -> SearchEngineKind {
        SearchEngineKind::Google
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::Unauthorized(
                "google search api key not configured".to_string(),
            ));
        };
        let Some(engine_id) = self.engine_id.as_deref() else {
            return Err(ToolError::Unauthorized(
                "google search engine id not configured".to_string(),
            ));
        };
        let params = Self::query_params(request);
        debug!("google search request (params={})", params.len());
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("key", api_key), ("cx", engine_id)])
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| map_send_error("google", err))?;
        let response = check_status("google", response).await?;
        let parsed: GoogleResponse = response.json().await.map_err(|err| {
            ToolError::ExecutionFailed(format!("google search response unreadable: {err}"))
        })?;
        let results = parsed.items.into_iter().map(SearchHit::from).collect();
        Ok(SearchResponse::new(
            SearchEngineKind::Google,
            &request.query,
            results,
        ))
    }
}
