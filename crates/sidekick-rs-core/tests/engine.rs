use axum::routing::post;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use serde_json::json;
use sidekick_rs_config::{BaiduSearchConfig, SearchEngineKind, SidekickConfig, ToolsConfig};
use sidekick_rs_core::{
    AttachmentError, ChatEngine, SessionStore, SidekickCoreError, StagedFileCache,
};
use sidekick_rs_llm::{
    AttachmentPayload, FileState, MessageType, ModelResponse, ProviderCapabilities, ProviderError,
};
use sidekick_rs_protocol::{AttachmentKind, EventPayload, Role, UploadStrategy};
use sidekick_rs_test_utils::{
    FailingProvider, RecordingSink, ScriptedProvider, StaticSearchProvider,
    gemini_like_capabilities, tool_call,
};
use sidekick_rs_tools::{
    BaiduSearch, SearchProvider, SearchRouter, ToolRegistry, builtin_tool_registry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

fn search_registry(search: &Arc<StaticSearchProvider>) -> ToolRegistry {
    let router = SearchRouter::new(vec![search.clone() as Arc<dyn SearchProvider>], false);
    builtin_tool_registry(&ToolsConfig::default(), Some(Arc::new(router)))
}

fn engine_with(
    config: SidekickConfig,
    provider: Arc<ScriptedProvider>,
    tools: ToolRegistry,
    root: &TempDir,
) -> ChatEngine {
    ChatEngine::new(config, provider, tools, SessionStore::new(None))
        .with_workspace_root(root.path())
}

fn weather_search() -> Arc<StaticSearchProvider> {
    Arc::new(StaticSearchProvider::with_hit(
        SearchEngineKind::Baidu,
        "Weather Report",
        "Sunny, 25C in Beijing today.",
    ))
}

#[tokio::test]
async fn tool_round_trip_searches_once_and_answers_from_result() {
    let root = tempdir().expect("root");
    let search = weather_search();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ModelResponse::with_tool_calls(
            "",
            vec![tool_call(
                "call_0",
                "baidu_search",
                json!({"query": "beijing weather", "search_recency_filter": "day"}),
            )],
        ),
        ModelResponse::text("It is sunny and 25C in Beijing."),
        ModelResponse::text("Beijing weather"),
    ]));
    let engine = engine_with(
        SidekickConfig::default(),
        provider.clone(),
        search_registry(&search),
        &root,
    );
    let session_id = engine.sessions().create_session(None).expect("session");

    let result = engine
        .send(session_id, "What's the weather in Beijing?", &[])
        .await
        .expect("turn");

    assert_eq!(search.call_count(), 1);
    assert_eq!(search.requests()[0].query, "beijing weather");
    assert!(result.response.contains("25C"));
    let outcome = result.tool_outcome.expect("tool outcome");
    assert!(outcome.success);
    assert_eq!(outcome.tool_name, "baidu_search");
    assert_eq!(result.title.as_deref(), Some("Beijing weather"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert!(requests[0].tools.iter().any(|tool| tool.name == "baidu_search"));
    assert!(requests[1].tools.is_empty());
    let last = requests[1].messages.last().expect("tool result message");
    match &last.message_type {
        MessageType::ToolResult(results) => {
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].call_id, "call_0");
            assert!(results[0].content.contains("Sunny, 25C in Beijing"));
        }
        other => panic!("unexpected message type: {other:?}"),
    }

    let session = engine.sessions().resume_session(session_id).expect("resume");
    let roles: Vec<Role> = session.messages.iter().map(|message| message.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(session.title, "Beijing weather");
    assert!(
        session
            .messages
            .windows(2)
            .all(|pair| pair[0].created_at < pair[1].created_at)
    );
}

#[tokio::test]
async fn only_the_first_tool_call_runs() {
    let root = tempdir().expect("root");
    let search = weather_search();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ModelResponse::with_tool_calls(
            "",
            vec![
                tool_call("call_0", "baidu_search", json!({"query": "beijing"})),
                tool_call("call_1", "baidu_search", json!({"query": "shanghai"})),
            ],
        ),
        ModelResponse::text("Beijing is sunny."),
    ]));
    let engine = engine_with(
        SidekickConfig::default(),
        provider.clone(),
        search_registry(&search),
        &root,
    );
    let session_id = engine.sessions().create_session(Some("Weather")).expect("session");

    engine
        .send(session_id, "Weather in Beijing and Shanghai?", &[])
        .await
        .expect("turn");

    assert_eq!(search.call_count(), 1);
    let requests = provider.requests();
    let last = requests[1].messages.last().expect("tool results");
    match &last.message_type {
        MessageType::ToolResult(results) => {
            assert_eq!(results.len(), 2);
            assert!(!results[0].is_error);
            assert!(results[1].is_error);
            assert!(results[1].content.contains("skipped"));
        }
        other => panic!("unexpected message type: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_arguments_never_reach_the_search_api() {
    let root = tempdir().expect("root");
    let search = weather_search();
    for arguments in [json!({"top_k": 3}), json!("{not json")] {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelResponse::with_tool_calls(
                "",
                vec![tool_call("call_0", "baidu_search", arguments)],
            ),
            ModelResponse::text("I could not search."),
        ]));
        let engine = engine_with(
            SidekickConfig::default(),
            provider.clone(),
            search_registry(&search),
            &root,
        );
        let session_id = engine.sessions().create_session(Some("Bad args")).expect("session");

        let result = engine
            .send(session_id, "search something", &[])
            .await
            .expect("turn survives tool errors");

        let outcome = result.tool_outcome.expect("outcome");
        assert!(!outcome.success);
        assert!(
            outcome
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("invalid arguments")
        );
        assert_eq!(result.response, "I could not search.");
    }
    assert_eq!(search.call_count(), 0);
}

#[tokio::test]
async fn search_timeouts_become_failed_tool_results() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/v2/ai_search/web_search",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "references": [] }))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    let baidu = BaiduSearch::from_config(
        &BaiduSearchConfig {
            api_url: format!("http://{addr}"),
            api_key: Some("bce-key".to_string()),
            timeout_secs: 1,
            ..BaiduSearchConfig::default()
        },
        reqwest::Client::new(),
    );
    let router = SearchRouter::new(vec![Arc::new(baidu) as Arc<dyn SearchProvider>], false);
    let tools = builtin_tool_registry(&ToolsConfig::default(), Some(Arc::new(router)));

    let root = tempdir().expect("root");
    let provider = Arc::new(ScriptedProvider::new(vec![
        ModelResponse::with_tool_calls(
            "",
            vec![tool_call(
                "call_0",
                "baidu_search",
                json!({"query": "beijing weather"}),
            )],
        ),
        ModelResponse::text("The search timed out, so I cannot check the weather."),
    ]));
    let engine = engine_with(SidekickConfig::default(), provider.clone(), tools, &root);
    let session_id = engine.sessions().create_session(None).expect("session");

    let result = engine
        .send(session_id, "What's the weather in Beijing?", &[])
        .await
        .expect("turn");

    assert!(result.response.contains("timed out"));
    let outcome = result.tool_outcome.expect("tool outcome");
    assert!(!outcome.success);
    assert_eq!(outcome.tool_name, "baidu_search");
    assert_eq!(
        outcome.error.as_deref(),
        Some("timed out: baidu search request timed out")
    );

    let requests = provider.requests();
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|message| message.role == Role::Tool)
        .expect("tool message");
    match &tool_message.message_type {
        MessageType::ToolResult(results) => {
            assert!(results[0].is_error);
            assert!(results[0].content.starts_with("{\"success\":false"));
        }
        other => panic!("unexpected message type: {other:?}"),
    }
}

#[tokio::test]
async fn oversized_attachments_are_staged_remotely() {
    let root = tempdir().expect("root");
    let image = root.path().join("big.png");
    std::fs::write(&image, vec![7u8; 32]).expect("image");

    let mut config = SidekickConfig::default();
    config.attachments.inline_max_bytes = 16;
    let provider = Arc::new(ScriptedProvider::new(vec![ModelResponse::text("A cat.")]));
    let sink = Arc::new(RecordingSink::new());
    let cache = Arc::new(StagedFileCache::in_memory());
    let engine = engine_with(config, provider.clone(), ToolRegistry::new(), &root)
        .with_event_sink(sink.clone())
        .with_file_cache(cache.clone());
    let session_id = engine.sessions().create_session(None).expect("session");

    engine
        .send(session_id, "What is this?", &[image])
        .await
        .expect("turn");

    assert_eq!(provider.staged_files(), vec!["big.png".to_string()]);
    let request = &provider.requests()[0];
    match &request.messages.last().expect("user message").message_type {
        MessageType::Attachments(items) => assert_eq!(
            items[0].payload,
            AttachmentPayload::Remote {
                uri: "https://files.test/files/1".to_string()
            }
        ),
        other => panic!("unexpected message type: {other:?}"),
    }
    assert!(sink.payloads().iter().any(|payload| matches!(
        payload,
        EventPayload::AttachmentStaged { display_name, .. } if display_name == "big.png"
    )));
    assert_eq!(cache.entries().len(), 1);

    let session = engine.sessions().resume_session(session_id).expect("resume");
    let stored = &session.messages[0].attachments[0];
    assert_eq!(stored.strategy, UploadStrategy::RemoteStaged);
    assert_eq!(stored.kind, AttachmentKind::Image);
    assert!(stored.expires_at.is_some());
}

#[tokio::test]
async fn switching_providers_replaces_staged_history_with_a_note() {
    let root = tempdir().expect("root");
    let clip = root.path().join("clip.mp4");
    std::fs::write(&clip, b"video").expect("clip");
    let sessions = SessionStore::new(None);
    let gemini = Arc::new(
        ScriptedProvider::new(vec![
            ModelResponse::text("A short clip of a cat."),
            ModelResponse::text("Cat clip"),
        ])
        .with_id("gemini"),
    );
    let gemini_engine = ChatEngine::new(
        SidekickConfig::default(),
        gemini.clone(),
        ToolRegistry::new(),
        sessions.clone(),
    )
    .with_workspace_root(root.path());
    let session_id = sessions.create_session(None).expect("session");
    gemini_engine
        .send(session_id, "What is in this video?", &[clip])
        .await
        .expect("gemini turn");
    assert_eq!(gemini.staged_files(), vec!["clip.mp4".to_string()]);
    let stored = sessions.resume_session(session_id).expect("resume");
    assert_eq!(
        stored.messages[0].attachments[0].provider.as_deref(),
        Some("gemini")
    );

    let deepseek = Arc::new(
        ScriptedProvider::new(vec![ModelResponse::text("It showed a cat.")])
            .with_id("deepseek")
            .with_capabilities(ProviderCapabilities {
                tools: true,
                streaming: true,
                ..ProviderCapabilities::text_only()
            }),
    );
    let deepseek_engine = ChatEngine::new(
        SidekickConfig::default(),
        deepseek.clone(),
        ToolRegistry::new(),
        sessions.clone(),
    )
    .with_workspace_root(root.path());
    let result = deepseek_engine
        .send(session_id, "What did the video show?", &[])
        .await
        .expect("deepseek turn");
    assert_eq!(result.response, "It showed a cat.");

    let request = &deepseek.requests()[0];
    assert!(request.messages.iter().all(|message| !matches!(
        message.message_type,
        MessageType::Attachments(_)
    )));
    let earlier = request
        .messages
        .iter()
        .find(|message| message.role == Role::User && message.content.starts_with("What is in"))
        .expect("earlier user message");
    assert!(
        earlier
            .content
            .contains("[attachment clip.mp4 (video/mp4) is no longer available]")
    );
}

#[tokio::test]
async fn small_images_are_inlined() {
    let root = tempdir().expect("root");
    let image = root.path().join("small.png");
    std::fs::write(&image, b"png").expect("image");
    let provider = Arc::new(ScriptedProvider::new(vec![ModelResponse::text("Tiny.")]));
    let engine = engine_with(
        SidekickConfig::default(),
        provider.clone(),
        ToolRegistry::new(),
        &root,
    );
    let session_id = engine.sessions().create_session(None).expect("session");

    engine
        .send(session_id, "Describe", &[image])
        .await
        .expect("turn");

    assert!(provider.staged_files().is_empty());
    match &provider.requests()[0].messages.last().expect("user").message_type {
        MessageType::Attachments(items) => assert_eq!(
            items[0].payload,
            AttachmentPayload::Inline {
                data: "cG5n".to_string()
            }
        ),
        other => panic!("unexpected message type: {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_types_are_rejected_for_every_provider() {
    let root = tempdir().expect("root");
    let notes = root.path().join("notes.txt");
    std::fs::write(&notes, b"hello").expect("notes");
    let inline_images = ProviderCapabilities {
        inline_kinds: vec![AttachmentKind::Image],
        ..ProviderCapabilities::text_only()
    };

    for capabilities in [
        gemini_like_capabilities(),
        ProviderCapabilities::text_only(),
        inline_images,
    ] {
        let provider = Arc::new(
            ScriptedProvider::new(vec![ModelResponse::text("unused")])
                .with_capabilities(capabilities),
        );
        let engine = engine_with(
            SidekickConfig::default(),
            provider.clone(),
            ToolRegistry::new(),
            &root,
        );
        let session_id = engine.sessions().create_session(None).expect("session");

        let err = engine
            .send(session_id, "read this", &[notes.clone()])
            .await
            .expect_err("rejected");
        assert!(matches!(
            err,
            SidekickCoreError::Attachment(AttachmentError::UnsupportedMime { .. })
        ));
        assert!(provider.requests().is_empty());
        assert!(provider.staged_files().is_empty());
        let session = engine.sessions().resume_session(session_id).expect("resume");
        assert!(session.messages.is_empty());
    }
}

#[tokio::test]
async fn failed_video_processing_blocks_the_turn() {
    let root = tempdir().expect("root");
    let clip = root.path().join("clip.mp4");
    std::fs::write(&clip, b"video").expect("clip");
    let mut config = SidekickConfig::default();
    config.attachments.poll_interval_ms = 1;
    let provider = Arc::new(
        ScriptedProvider::new(vec![ModelResponse::text("unused")])
            .with_file_states(vec![FileState::Processing, FileState::Failed]),
    );
    let engine = engine_with(config, provider.clone(), ToolRegistry::new(), &root);
    let session_id = engine.sessions().create_session(None).expect("session");

    let err = engine
        .send(session_id, "summarize", &[clip])
        .await
        .expect_err("staging failed");
    assert!(matches!(
        err,
        SidekickCoreError::Attachment(AttachmentError::StagingUnavailable { .. })
    ));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn provider_errors_surface_as_error_events() {
    let root = tempdir().expect("root");
    let sink = Arc::new(RecordingSink::new());
    let engine = ChatEngine::new(
        SidekickConfig::default(),
        Arc::new(FailingProvider::new(401, "invalid api key")),
        ToolRegistry::new(),
        SessionStore::new(None),
    )
    .with_workspace_root(root.path())
    .with_event_sink(sink.clone());
    let session_id = engine.sessions().create_session(None).expect("session");

    let err = engine
        .send(session_id, "hello", &[])
        .await
        .expect_err("provider failure");
    assert!(matches!(
        err,
        SidekickCoreError::Provider(ProviderError::Status { status: 401, .. })
    ));
    let payloads = sink.payloads();
    assert!(matches!(payloads.first(), Some(EventPayload::TurnStarted { .. })));
    assert!(matches!(
        payloads.last(),
        Some(EventPayload::Error { message, .. }) if message.contains("invalid api key")
    ));
}

#[tokio::test]
async fn send_stream_reports_deltas_and_completion() {
    let root = tempdir().expect("root");
    let provider = Arc::new(ScriptedProvider::new(vec![ModelResponse::text(
        "Hello there friend",
    )]));
    let sink = Arc::new(RecordingSink::new());
    let engine = engine_with(
        SidekickConfig::default(),
        provider,
        ToolRegistry::new(),
        &root,
    )
    .with_event_sink(sink.clone());
    let session_id = engine.sessions().create_session(Some("Greeting")).expect("session");

    let stream = engine.send_stream(session_id, "hi", Vec::<PathBuf>::new());
    let turn_id = stream.turn_id;
    let result = stream.finish().await.expect("turn");

    assert_eq!(result.response, "Hello there friend");
    assert_eq!(result.turn_id, turn_id);
    assert_eq!(sink.streamed_text(), "Hello there friend");
    assert!(matches!(
        sink.payloads().last(),
        Some(EventPayload::TurnCompleted { message, .. }) if message == "Hello there friend"
    ));
}
