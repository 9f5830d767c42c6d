//! Web search tools, one per engine.

use crate::builtins::utils::{clean_list, parse_args};
use crate::search::{Recency, SearchRequest, SearchRouter};
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use sidekick_rs_config::SearchEngineKind;
use sidekick_rs_protocol::ToolError;
use std::sync::Arc;

/// Default number of results.
const DEFAULT_TOP_K: usize = 5;
/// Most site entries accepted per call.
const MAX_SITES: usize = 20;

/// `baidu_search`: Qianfan AI search with recency and site filters.
#[derive(Clone)]
pub struct BaiduSearchTool {
    router: Arc<SearchRouter>,
}

impl BaiduSearchTool {
    pub fn new(router: Arc<SearchRouter>) -> Self {
        Self { router }
    }
}

impl std::fmt::Debug for BaiduSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaiduSearchTool").finish()
    }
}

#[derive(Debug, Deserialize)]
struct BaiduArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    search_recency_filter: Option<String>,
    #[serde(default)]
    site_filter: Option<Vec<String>>,
}

#[async_trait]
impl Tool for BaiduSearchTool {
    fn name(&self) -> &str {
        "baidu_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information such as news, weather, prices, or recent events. \
         Supports a recency window and restricting results to specific sites."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Search keywords or question."
                },
                "top_k": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10,
                    "default": DEFAULT_TOP_K,
                    "description": "Number of results to return."
                },
                "search_recency_filter": {
                    "type": "string",
                    "enum": ["day", "week", "month", "year"],
                    "description": "Only return pages published within this window."
                },
                "site_filter": {
                    "type": "array",
                    "items": { "type": "string" },
                    "maxItems": MAX_SITES,
                    "description": "Only return pages from these sites, e.g. www.weather.com.cn."
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let input: BaiduArgs = parse_args(args)?;
        let recency = match input.search_recency_filter.as_deref() {
            None => None,
            Some("day") => Some(Recency::Day),
            Some("week") => Some(Recency::Week),
            Some("month") => Some(Recency::Month),
            Some("year") => Some(Recency::Year),
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unsupported search_recency_filter: {other}"
                )));
            }
        };
        let request = SearchRequest {
            query: input.query.trim().to_string(),
            limit: input.top_k.unwrap_or(DEFAULT_TOP_K),
            recency,
            sites: clean_list(input.site_filter.unwrap_or_default()),
        };
        run_search(&self.router, SearchEngineKind::Baidu, request).await
    }
}

/// `google_search`: Custom Search with date restriction and a site filter.
#[derive(Clone)]
pub struct GoogleSearchTool {
    router: Arc<SearchRouter>,
}

impl GoogleSearchTool {
    pub fn new(router: Arc<SearchRouter>) -> Self {
        Self { router }
    }
}

impl std::fmt::Debug for GoogleSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSearchTool").finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleArgs {
    query: String,
    #[serde(default)]
    num: Option<usize>,
    #[serde(default)]
    date_restrict: Option<String>,
    #[serde(default)]
    site_search: Option<String>,
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "google_search"
    }

    fn description(&self) -> &str {
        "Search Google for up-to-date web pages. Use for recent events or facts that \
         may have changed after training."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Search keywords or question."
                },
                "num": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10,
                    "default": DEFAULT_TOP_K,
                    "description": "Number of results to return."
                },
                "dateRestrict": {
                    "type": "string",
                    "enum": ["d1", "d7", "w1", "m1", "m6", "y1"],
                    "description": "Only return pages from the past day (d1), week (d7/w1), month (m1), six months (m6), or year (y1)."
                },
                "siteSearch": {
                    "type": "string",
                    "description": "Only return pages from this site."
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let input: GoogleArgs = parse_args(args)?;
        let recency = match input.date_restrict.as_deref() {
            None => None,
            Some("d1") => Some(Recency::Day),
            Some("d7") | Some("w1") => Some(Recency::Week),
            Some("m1") => Some(Recency::Month),
            Some("m6") => Some(Recency::HalfYear),
            Some("y1") => Some(Recency::Year),
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unsupported dateRestrict: {other}"
                )));
            }
        };
        let request = SearchRequest {
            query: input.query.trim().to_string(),
            limit: input.num.unwrap_or(DEFAULT_TOP_K),
            recency,
            sites: clean_list(input.site_search.into_iter().collect()),
        };
        run_search(&self.router, SearchEngineKind::Google, request).await
    }
}

async fn run_search(
    router: &SearchRouter,
    engine: SearchEngineKind,
    request: SearchRequest,
) -> Result<Value, ToolError> {
    if request.query.is_empty() {
        return Err(ToolError::InvalidArguments(
            "query cannot be empty".to_string(),
        ));
    }
    let response = router.search_with(engine, &request).await?;
    serde_json::to_value(response)
        .map_err(|err| ToolError::ExecutionFailed(format!("search result not encodable: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{BaiduSearchTool, GoogleSearchTool};
    use crate::search::{SearchProvider, SearchRequest, SearchResponse, SearchRouter};
    use crate::{Tool, ToolContext, TurnServices};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sidekick_rs_config::SearchEngineKind;
    use sidekick_rs_protocol::ToolError;
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Default)]
    struct CapturingEngine {
        requests: Mutex<Vec<SearchRequest>>,
    }

    #[async_trait]
    impl SearchProvider for CapturingEngine {
        fn engine(&self) -> SearchEngineKind {
            SearchEngineKind::Baidu
        }

        async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ToolError> {
            self.requests.lock().push(request.clone());
            Ok(SearchResponse::new(
                SearchEngineKind::Baidu,
                &request.query,
                Vec::new(),
            ))
        }
    }

    fn context() -> ToolContext {
        ToolContext::new(Uuid::nil(), None, Arc::new(TurnServices::new("/tmp")))
    }

    #[tokio::test]
    async fn baidu_tool_maps_filters() {
        let engine = Arc::new(CapturingEngine::default());
        let router = Arc::new(SearchRouter::new(vec![engine.clone() as Arc<dyn SearchProvider>], false));
        let tool = BaiduSearchTool::new(router);
        let result = tool
            .call(
                &context(),
                json!({
                    "query": " weather ",
                    "top_k": 2,
                    "search_recency_filter": "week",
                    "site_filter": ["www.weather.com.cn", " "]
                }),
            )
            .await
            .expect("search");
        assert_eq!(result["engine"], "baidu");
        let requests = engine.requests.lock();
        assert_eq!(requests[0].query, "weather");
        assert_eq!(requests[0].limit, 2);
        assert_eq!(requests[0].recency, Some(crate::search::Recency::Week));
        assert_eq!(requests[0].sites, vec!["www.weather.com.cn"]);
    }

    #[tokio::test]
    async fn google_tool_without_engine_reports_disabled() {
        let engine = Arc::new(CapturingEngine::default());
        let router = Arc::new(SearchRouter::new(vec![engine.clone() as Arc<dyn SearchProvider>], false));
        let tool = GoogleSearchTool::new(router);
        let err = tool
            .call(&context(), json!({ "query": "rust", "dateRestrict": "m6" }))
            .await
            .expect_err("disabled");
        match err {
            ToolError::ExecutionFailed(message) => {
                assert_eq!(message, "google search is not enabled")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(engine.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let router = Arc::new(SearchRouter::new(Vec::new(), true));
        let err = BaiduSearchTool::new(router)
            .call(&context(), json!({ "query": "   " }))
            .await
            .expect_err("blank");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
