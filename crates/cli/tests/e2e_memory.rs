//! End-to-end tests for the convmem memory service.
//!
//! These drive the HTTP router over a real SQLite database and the
//! in-memory hot store, with an LLM-backed summarizer fed by a scripted
//! provider. A "restart" swaps in a fresh hot store over the same database.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use convmem_config::MemoryConfig;
use convmem_core::error::ProviderError;
use convmem_core::provider::{Provider, ProviderRequest, ProviderResponse};
use convmem_gateway::{ApiState, Responder, SharedApiState, build_router};
use convmem_memory::{InMemoryHotStore, MemoryOrchestrator, SqliteDurableStore};
use convmem_providers::LlmSummarizer;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Answers chat, summary and extraction prompts with canned text.
struct ScriptedProvider {
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(last.clone());

        let content = if last.starts_with("Summarize") {
            "The user introduced themselves and talked about tea.".to_string()
        } else if last.starts_with("Extract") {
            "- Name is Ada\n- Likes green tea\n- Lives in Lisbon\n- Works as an engineer\n- Prefers short answers"
                .to_string()
        } else {
            format!("You said: {last}")
        };

        Ok(ProviderResponse {
            content,
            model: "mock-model".into(),
            usage: None,
        })
    }
}

async fn open_state(db_path: &str, provider: Arc<ScriptedProvider>) -> SharedApiState {
    let durable = SqliteDurableStore::open(db_path, 2).await.unwrap();
    let summarizer = Arc::new(LlmSummarizer::new(provider.clone(), "mock-model"));
    let memory = MemoryOrchestrator::new(
        Arc::new(InMemoryHotStore::new()),
        Arc::new(durable),
        summarizer,
        MemoryConfig::default(),
    );
    Arc::new(ApiState {
        memory: Arc::new(memory),
        responder: Responder::new(provider, "mock-model", 0.7),
    })
}

async fn call(state: &SharedApiState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn chat(message: &str) -> Request<Body> {
    post(
        "/chat",
        json!({"message": message, "user_id": "ada", "conversation_id": "tea"}),
    )
}

fn session() -> Value {
    json!({"user_id": "ada", "conversation_id": "tea"})
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn eight_turns_escalate_and_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("memory.sqlite");
    let db_path = db_path.to_string_lossy().into_owned();
    let provider = Arc::new(ScriptedProvider::new());

    let state = open_state(&db_path, provider.clone()).await;
    for message in [
        "Hi, I'm Ada",
        "I live in Lisbon",
        "I love green tea",
        "Keep answers short please",
    ] {
        let (status, body) = call(&state, chat(message)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], format!("You said: {message}"));
        assert_eq!(body["degraded"], false);
    }

    // Turn 4 found an empty summary window; turn 8 summarized and extracted.
    assert_eq!(provider.count("Summarize"), 1);
    assert_eq!(provider.count("Extract"), 1);

    let (_, memory) = call(&state, get("/memory/ada/tea")).await;
    let context = &memory["memory_state"];
    assert_eq!(
        context["slider_summary"],
        "The user introduced themselves and talked about tea."
    );
    assert_eq!(context["long_term_points"].as_array().unwrap().len(), 5);
    assert_eq!(context["long_term_points"][1], "Likes green tea");
    let window = context["short_term_messages"].as_array().unwrap();
    assert_eq!(window.len(), 4);
    assert_eq!(window[0]["content"], "I love green tea");
    assert_eq!(window[3]["content"], "You said: Keep answers short please");

    let (status, logout) = call(&state, post("/logout", session())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logout["message"], "Logout completed successfully");
    state.memory.close().await;

    // Restart: same database, empty hot tier.
    let state = open_state(&db_path, provider.clone()).await;
    let (_, memory) = call(&state, get("/memory/ada/tea")).await;
    assert!(
        memory["memory_state"]["short_term_messages"]
            .as_array()
            .unwrap()
            .is_empty()
    );

    let (_, login) = call(&state, post("/login", session())).await;
    assert_eq!(login["message"], "Memory restored successfully");
    assert_eq!(login["degraded"], false);

    let (_, memory) = call(&state, get("/memory/ada/tea")).await;
    let context = &memory["memory_state"];
    assert_eq!(context["short_term_messages"].as_array().unwrap().len(), 4);
    assert_eq!(
        context["slider_summary"],
        "The user introduced themselves and talked about tea."
    );

    let (_, history) = call(&state, get("/history/ada?limit=3")).await;
    assert_eq!(history["total"], 8);
    assert_eq!(history["messages"].as_array().unwrap().len(), 3);
    assert_eq!(
        history["messages"][0]["content"],
        "You said: Keep answers short please"
    );

    let batches = state
        .memory
        .durable_store()
        .long_term_batches("ada")
        .await
        .unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].source_conversation_id, "tea");
    state.memory.close().await;
}

#[tokio::test]
async fn conversations_share_long_term_but_not_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("memory.sqlite");
    let provider = Arc::new(ScriptedProvider::new());
    let state = open_state(&db_path.to_string_lossy(), provider).await;

    for i in 0..4 {
        call(&state, chat(&format!("message {i}"))).await;
    }
    let (status, _) = call(
        &state,
        post(
            "/chat",
            json!({"message": "new topic", "user_id": "ada", "conversation_id": "travel"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, memory) = call(&state, get("/memory/ada/travel")).await;
    let context = &memory["memory_state"];
    assert_eq!(context["short_term_messages"].as_array().unwrap().len(), 2);
    assert_eq!(context["slider_summary"], "");
    assert_eq!(context["long_term_points"].as_array().unwrap().len(), 5);

    let log = state
        .memory
        .durable_store()
        .conversation_log("ada", "travel")
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].content, "new topic");

    let (_, history) = call(&state, get("/history/ada")).await;
    assert_eq!(history["total"], 10);
}
