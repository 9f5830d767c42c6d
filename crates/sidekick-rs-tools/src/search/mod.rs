//! Web search engines and the router that picks between them.

mod baidu;
mod google;
mod http;

pub use baidu::BaiduSearch;
pub use google::GoogleSearch;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sidekick_rs_config::{SearchConfig, SearchEngineKind};
use sidekick_rs_protocol::ToolError;
use std::sync::Arc;

/// Longest summary derived from the top result.
const SUMMARY_MAX_CHARS: usize = 500;

/// Publication-time window applied to results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    Day,
    Week,
    Month,
    HalfYear,
    Year,
}

/// Engine-neutral search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query text.
    pub query: String,
    /// Number of results wanted (1..=10).
    pub limit: usize,
    /// Optional recency window.
    pub recency: Option<Recency>,
    /// Sites results must come from; empty means any.
    pub sites: Vec<String>,
}

impl SearchRequest {
    /// Request with default limit and no filters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 5,
            recency: None,
            sites: Vec::new(),
        }
    }
}

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Source site or display domain.
    #[serde(default)]
    pub site: String,
    /// Publication date when the engine reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Normalized response shared by all engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Engine that produced the results.
    pub engine: String,
    pub query: String,
    /// Short digest of the top result.
    pub summary: String,
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    /// Build a response, deriving the summary from the first hit.
    pub fn new(engine: SearchEngineKind, query: &str, results: Vec<SearchHit>) -> Self {
        Self {
            engine: engine.as_str().to_string(),
            query: query.to_string(),
            summary: summarize(&results),
            results,
        }
    }
}

/// Summary text: the first hit's snippet, capped at 500 characters plus `...`.
pub fn summarize(results: &[SearchHit]) -> String {
    let Some(first) = results.first() else {
        return String::new();
    };
    let snippet = first.snippet.trim();
    if snippet.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = snippet.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        snippet.to_string()
    }
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Engine identity.
    fn engine(&self) -> SearchEngineKind;
    /// Run a search.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ToolError>;
}

/// Ordered set of engines with optional fallback on failure.
#[derive(Clone)]
pub struct SearchRouter {
    providers: Vec<Arc<dyn SearchProvider>>,
    fallback_enabled: bool,
}

impl SearchRouter {
    /// Build a router over providers in preference order.
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, fallback_enabled: bool) -> Self {
        Self {
            providers,
            fallback_enabled,
        }
    }

    /// Build the configured engines, primary first.
    pub fn from_config(config: &SearchConfig, client: reqwest::Client) -> Self {
        let providers = config
            .ordered_engines()
            .into_iter()
            .map(|engine| -> Arc<dyn SearchProvider> {
                match engine {
                    SearchEngineKind::Baidu => {
                        Arc::new(BaiduSearch::from_config(&config.baidu, client.clone()))
                    }
                    SearchEngineKind::Google => {
                        Arc::new(GoogleSearch::from_config(&config.google, client.clone()))
                    }
                }
            })
            .collect();
        Self::new(providers, config.fallback_enabled)
    }

    /// Engines in preference order.
    pub fn engines(&self) -> Vec<SearchEngineKind> {
        self.providers.iter().map(|provider| provider.engine()).collect()
    }

    /// Search with `engine` first, then the remaining engines when fallback is on.
    pub async fn search_with(
        &self,
        engine: SearchEngineKind,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ToolError> {
        let mut candidates: Vec<&Arc<dyn SearchProvider>> = self
            .providers
            .iter()
            .filter(|provider| provider.engine() == engine)
            .collect();
        if self.fallback_enabled {
            candidates.extend(
                self.providers
                    .iter()
                    .filter(|provider| provider.engine() != engine),
            );
        }
        let mut last_error =
            ToolError::ExecutionFailed(format!("{} search is not enabled", engine.as_str()));
        for provider in candidates {
            info!(
                "web search (engine={}, query_len={}, top_k={})",
                provider.engine().as_str(),
                request.query.len(),
                request.limit
            );
            match provider.search(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "web search failed (engine={}, kind={}): {}",
                        provider.engine().as_str(),
                        err.kind(),
                        err
                    );
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}
