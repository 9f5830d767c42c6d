//! Search engines against in-process HTTP servers.

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sidekick_rs_config::BaiduSearchConfig;
use sidekick_rs_protocol::ToolError;
use sidekick_rs_tools::{
    BaiduSearch, GoogleSearch, Recency, SearchProvider, SearchRequest, SearchRouter,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn baidu_posts_filters_and_normalizes_references() {
    let captured: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let app = Router::new().route(
        "/v2/ai_search/web_search",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                *sink.lock() = Some((auth, body));
                Json(json!({
                    "request_id": "r-1",
                    "references": [
                        {
                            "title": "Shanghai weather",
                            "url": "https://www.weather.com.cn/sh",
                            "content": "full page text",
                            "snippet": "",
                            "date": "2024-05-01",
                            "website": "weather.com.cn"
                        },
                        { "title": "Second", "url": "https://b", "snippet": "b" }
                    ]
                }))
            }
        }),
    );
    let base = serve(app).await;

    let search = BaiduSearch::new(reqwest::Client::new(), format!("{base}/"), Some("bce-key".to_string()));
    let mut request = SearchRequest::new("上海天气");
    request.recency = Some(Recency::Day);
    request.sites = vec!["www.weather.com.cn".to_string()];
    let response = search.search(&request).await.expect("search");

    assert_eq!(response.engine, "baidu");
    assert_eq!(response.summary, "full page text");
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].site, "weather.com.cn");
    assert_eq!(response.results[0].date.as_deref(), Some("2024-05-01"));

    let (auth, body) = captured.lock().clone().expect("request");
    assert_eq!(auth.as_deref(), Some("Bearer bce-key"));
    assert_eq!(body["search_recency_filter"], "day");
    assert_eq!(
        body["search_filter"],
        json!({ "match": { "site": ["www.weather.com.cn"] } })
    );
}

#[tokio::test]
async fn baidu_maps_auth_failures() {
    let app = Router::new().route(
        "/v2/ai_search/web_search",
        post(|| async { (StatusCode::UNAUTHORIZED, "invalid token") }),
    );
    let base = serve(app).await;
    let search = BaiduSearch::new(reqwest::Client::new(), base, Some("bad".to_string()));
    let err = search
        .search(&SearchRequest::new("q"))
        .await
        .expect_err("unauthorized");
    match err {
        ToolError::Unauthorized(message) => assert!(message.contains("invalid token")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_engines_time_out() {
    let app = Router::new().route(
        "/v2/ai_search/web_search",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "references": [] }))
        }),
    );
    let base = serve(app).await;
    let config = BaiduSearchConfig {
        api_url: base,
        api_key: Some("bce-key".to_string()),
        timeout_secs: 1,
        ..BaiduSearchConfig::default()
    };
    let search = BaiduSearch::from_config(&config, reqwest::Client::new());

    let started = Instant::now();
    let err = search
        .search(&SearchRequest::new("q"))
        .await
        .expect_err("timeout");
    assert!(started.elapsed() < Duration::from_secs(3));
    match err {
        ToolError::Timeout(message) => assert_eq!(message, "baidu search request timed out"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_key_fails_before_any_request() {
    let search = BaiduSearch::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
    let err = search
        .search(&SearchRequest::new("q"))
        .await
        .expect_err("no key");
    assert!(matches!(err, ToolError::Unauthorized(_)));
}

#[tokio::test]
async fn google_sends_query_params_and_router_falls_back() {
    let captured: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
    let sink = captured.clone();
    let app = Router::new()
        .route(
            "/customsearch/v1",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let sink = sink.clone();
                async move {
                    *sink.lock() = params;
                    Json(json!({
                        "items": [{
                            "title": "Rust 1.80",
                            "link": "https://blog.rust-lang.org/",
                            "snippet": "Rust 1.80\nreleased",
                            "displayLink": "blog.rust-lang.org"
                        }]
                    }))
                }
            }),
        )
        .route(
            "/v2/ai_search/web_search",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        );
    let base = serve(app).await;

    let client = reqwest::Client::new();
    let router = SearchRouter::new(
        vec![
            Arc::new(BaiduSearch::new(client.clone(), base.clone(), Some("k".to_string())))
                as Arc<dyn SearchProvider>,
            Arc::new(GoogleSearch::new(
                client,
                format!("{base}/customsearch/v1"),
                Some("g-key".to_string()),
                Some("cx-1".to_string()),
            )),
        ],
        true,
    );
    let mut request = SearchRequest::new("rust release");
    request.recency = Some(Recency::Month);
    let response = router
        .search_with(sidekick_rs_config::SearchEngineKind::Baidu, &request)
        .await
        .expect("fallback");

    assert_eq!(response.engine, "google");
    assert_eq!(response.summary, "Rust 1.80 released");
    let params = captured.lock().clone();
    assert_eq!(params.get("key").map(String::as_str), Some("g-key"));
    assert_eq!(params.get("cx").map(String::as_str), Some("cx-1"));
    assert_eq!(params.get("q").map(String::as_str), Some("rust release"));
    assert_eq!(params.get("dateRestrict").map(String::as_str), Some("m1"));
}
