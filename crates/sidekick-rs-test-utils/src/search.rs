use async_trait::async_trait;
use parking_lot::Mutex;
use sidekick_rs_config::SearchEngineKind;
use sidekick_rs_protocol::ToolError;
use sidekick_rs_tools::{SearchHit, SearchProvider, SearchRequest, SearchResponse};

/// Search engine returning canned hits and recording every request.
pub struct StaticSearchProvider {
    engine: SearchEngineKind,
    hits: Vec<SearchHit>,
    failure: Option<String>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticSearchProvider {
    pub fn new(engine: SearchEngineKind, hits: Vec<SearchHit>) -> Self {
        Self {
            engine,
            hits,
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Engine whose every search fails with `message`.
    pub fn failing(engine: SearchEngineKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(engine, Vec::new())
        }
    }

    /// Single-hit engine.
    pub fn with_hit(engine: SearchEngineKind, title: &str, snippet: &str) -> Self {
        Self::new(
            engine,
            vec![SearchHit {
                title: title.to_string(),
                url: format!("https://example.com/{}", title.to_lowercase().replace(' ', "-")),
                snippet: snippet.to_string(),
                site: "example.com".to_string(),
                date: None,
            }],
        )
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn engine(&self) -> SearchEngineKind {
        self.engine
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ToolError> {
        self.requests.lock().push(request.clone());
        if let Some(message) = &self.failure {
            return Err(ToolError::ExecutionFailed(message.clone()));
        }
        let hits = self.hits.iter().take(request.limit).cloned().collect();
        Ok(SearchResponse::new(self.engine, &request.query, hits))
    }
}
