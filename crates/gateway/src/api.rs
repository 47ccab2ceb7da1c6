//! HTTP API: a thin pass-through to the memory orchestrator.
//!
//! Endpoints:
//!
//! - `GET  /`, `GET /health`: Service status
//! - `POST /chat`: Send a message, get a response
//! - `POST /login`: Restore short-term memory
//! - `POST /logout`: Persist and clear the session
//! - `GET  /memory/{user_id}/{conversation_id}`: Current memory state (debug)
//! - `GET  /history/{user_id}?skip&limit`: Paginated durable chat log

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use convmem_core::memory::{ChatLogEntry, MemoryContext};
use convmem_core::message::Turn;
use convmem_memory::MemoryOrchestrator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::reply::Responder;

/// Largest page `/history` will return.
pub const MAX_HISTORY_LIMIT: u64 = 100;
const DEFAULT_HISTORY_LIMIT: u64 = 20;

/// Shared state for the API.
pub struct ApiState {
    pub memory: Arc<MemoryOrchestrator>,
    pub responder: Responder,
}

pub type SharedApiState = Arc<ApiState>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the API router (no middleware).
pub fn api_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/memory/{user_id}/{conversation_id}", get(memory_handler))
        .route("/history/{user_id}", get(history_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub user_id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Memory was only partly updated, or the reply is the fallback text.
    pub degraded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub user_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub status: String,
    pub message: String,
    pub user_id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub degraded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryResponse {
    pub user_id: String,
    pub conversation_id: String,
    pub memory_state: MemoryContext,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub messages: Vec<ChatLogEntry>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub hot_store: String,
    pub durable_store: String,
    pub provider: String,
    pub provider_reachable: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("'{field}' must not be empty"),
        ))
    } else {
        Ok(())
    }
}

fn require_session(user_id: &str, conversation_id: &str) -> Result<(), ApiError> {
    require("user_id", user_id)?;
    require("conversation_id", conversation_id)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: "convmem".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        hot_store: state.memory.hot_store().name().into(),
        durable_store: state.memory.durable_store().name().into(),
        provider: state.responder.provider_name().into(),
        provider_reachable: state.responder.provider_reachable().await,
        timestamp: Utc::now(),
    })
}

async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    require_session(&payload.user_id, &payload.conversation_id)?;
    require("message", &payload.message)?;

    let user_id = payload.user_id.as_str();
    let conversation_id = payload.conversation_id.as_str();
    info!(
        user_id,
        conversation_id,
        chars = payload.message.len(),
        "Chat request"
    );

    let user_report = state
        .memory
        .ingest(user_id, conversation_id, Turn::user(payload.message.clone()))
        .await
        .map_err(|e| {
            error!(user_id, conversation_id, "User turn not recorded: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?;

    let context = state.memory.get_context(user_id, conversation_id).await;
    let reply = state.responder.reply(&context, &payload.message).await;

    let assistant_degraded = match state
        .memory
        .ingest(user_id, conversation_id, Turn::assistant(reply.text.clone()))
        .await
    {
        Ok(report) => report.is_degraded(),
        Err(e) => {
            error!(user_id, conversation_id, "Assistant turn not recorded: {e}");
            true
        }
    };

    Ok(Json(ChatResponse {
        response: reply.text,
        user_id: payload.user_id.clone(),
        conversation_id: payload.conversation_id.clone(),
        timestamp: Utc::now(),
        degraded: user_report.is_degraded() || reply.fallback || assistant_degraded,
    }))
}

async fn login_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    require_session(&payload.user_id, &payload.conversation_id)?;
    info!(user_id = %payload.user_id, conversation_id = %payload.conversation_id, "Login request");

    let report = state
        .memory
        .login(&payload.user_id, &payload.conversation_id)
        .await;
    let message = if report.transferred {
        "Memory restored successfully"
    } else {
        "No saved memory for this conversation"
    };

    Ok(Json(SessionResponse {
        status: "success".into(),
        message: message.into(),
        user_id: payload.user_id,
        conversation_id: payload.conversation_id,
        timestamp: Utc::now(),
        degraded: report.is_degraded(),
    }))
}

async fn logout_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    require_session(&payload.user_id, &payload.conversation_id)?;
    info!(user_id = %payload.user_id, conversation_id = %payload.conversation_id, "Logout request");

    let report = state
        .memory
        .logout(&payload.user_id, &payload.conversation_id)
        .await;

    Ok(Json(SessionResponse {
        status: "success".into(),
        message: "Logout completed successfully".into(),
        user_id: payload.user_id,
        conversation_id: payload.conversation_id,
        timestamp: Utc::now(),
        degraded: report.is_degraded(),
    }))
}

async fn memory_handler(
    State(state): State<SharedApiState>,
    Path((user_id, conversation_id)): Path<(String, String)>,
) -> Json<MemoryResponse> {
    let memory_state = state.memory.get_context(&user_id, &conversation_id).await;
    Json(MemoryResponse {
        user_id,
        conversation_id,
        memory_state,
        timestamp: Utc::now(),
    })
}

async fn history_handler(
    State(state): State<SharedApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let skip = query.skip.unwrap_or(0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    let page = state
        .memory
        .history(&user_id, skip, limit)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, "History query failed: {e}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get chat history",
            )
        })?;

    Ok(Json(HistoryResponse {
        user_id,
        messages: page.entries,
        total: page.total,
        skip,
        limit,
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use convmem_config::MemoryConfig;
    use convmem_core::error::{CollaboratorError, ProviderError};
    use convmem_core::provider::{Provider, ProviderRequest, ProviderResponse, Summarizer};
    use convmem_memory::{InMemoryDurableStore, InMemoryHotStore};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        response_text: Option<String>,
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            match &self.response_text {
                Some(text) => Ok(ProviderResponse {
                    content: text.clone(),
                    model: "mock-model".into(),
                    usage: None,
                }),
                None => Err(ProviderError::Network("unreachable".into())),
            }
        }
    }

    struct QuietSummarizer;

    #[async_trait]
    impl Summarizer for QuietSummarizer {
        async fn summarize(&self, _transcript: &str) -> Result<String, CollaboratorError> {
            Ok("They chatted.".into())
        }

        async fn extract(&self, _transcript: &str, _points: usize) -> Result<String, CollaboratorError> {
            Ok("- a\n- b\n- c\n- d\n- e".into())
        }
    }

    fn test_state(reply: Option<&str>) -> SharedApiState {
        let memory = MemoryOrchestrator::new(
            Arc::new(InMemoryHotStore::new()),
            Arc::new(InMemoryDurableStore::new()),
            Arc::new(QuietSummarizer),
            MemoryConfig::default(),
        );
        let provider = Arc::new(MockProvider {
            response_text: reply.map(String::from),
        });
        Arc::new(ApiState {
            memory: Arc::new(memory),
            responder: Responder::new(provider, "mock-model", 0.7),
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
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

    async fn json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn chat(message: &str) -> Request<Body> {
        post_json(
            "/chat",
            serde_json::json!({"message": message, "user_id": "u1", "conversation_id": "c1"}),
        )
    }

    #[tokio::test]
    async fn health_reports_stores() {
        let app = api_router(test_state(Some("hi")));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = json(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.hot_store, "memory");
        assert_eq!(health.provider, "gateway_mock");
        assert!(health.provider_reachable);
    }

    #[tokio::test]
    async fn chat_records_both_turns() {
        let state = test_state(Some("Hello back!"));

        let response = api_router(state.clone())
            .oneshot(chat("Hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let chat: ChatResponse = json(response).await;
        assert_eq!(chat.response, "Hello back!");
        assert!(!chat.degraded);

        let context = state.memory.get_context("u1", "c1").await;
        let contents: Vec<_> = context
            .short_term_messages
            .iter()
            .map(|t| t.content().to_string())
            .collect();
        assert_eq!(contents, vec!["Hello", "Hello back!"]);
    }

    #[tokio::test]
    async fn chat_with_failing_provider_degrades() {
        let state = test_state(None);
        let response = api_router(state.clone())
            .oneshot(chat("Hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chat: ChatResponse = json(response).await;
        assert!(chat.degraded);
        assert!(chat.response.starts_with("I apologize"));
        assert_eq!(state.memory.history("u1", 0, 10).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let app = api_router(test_state(Some("hi")));
        let response = app.oneshot(chat("   ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let app = api_router(test_state(Some("hi")));
        let response = app
            .oneshot(post_json(
                "/login",
                serde_json::json!({"user_id": "", "conversation_id": "c1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = json(response).await;
        assert!(err.error.contains("user_id"));
    }

    #[tokio::test]
    async fn logout_then_login_round_trip() {
        let state = test_state(Some("Sure."));
        for message in ["one", "two"] {
            api_router(state.clone())
                .oneshot(chat(message))
                .await
                .unwrap();
        }

        let session = serde_json::json!({"user_id": "u1", "conversation_id": "c1"});
        let response = api_router(state.clone())
            .oneshot(post_json("/logout", session.clone()))
            .await
            .unwrap();
        let logout: SessionResponse = json(response).await;
        assert_eq!(logout.status, "success");
        assert!(state.memory.get_context("u1", "c1").await.short_term_messages.is_empty());

        let response = api_router(state.clone())
            .oneshot(post_json("/login", session))
            .await
            .unwrap();
        let login: SessionResponse = json(response).await;
        assert_eq!(login.message, "Memory restored successfully");

        let response = api_router(state.clone())
            .oneshot(get("/memory/u1/c1"))
            .await
            .unwrap();
        let memory: MemoryResponse = json(response).await;
        assert_eq!(memory.memory_state.short_term_messages.len(), 4);
        assert!(memory.memory_state.recent_history.is_empty());
    }

    #[tokio::test]
    async fn history_is_paged_and_capped() {
        let state = test_state(Some("ok"));
        for i in 0..3 {
            api_router(state.clone())
                .oneshot(chat(&format!("m{i}")))
                .await
                .unwrap();
        }

        let response = api_router(state.clone())
            .oneshot(get("/history/u1?skip=1&limit=2"))
            .await
            .unwrap();
        let page: HistoryResponse = json(response).await;
        assert_eq!(page.total, 6);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.skip, 1);

        let response = api_router(state)
            .oneshot(get("/history/u1?limit=5000"))
            .await
            .unwrap();
        let page: HistoryResponse = json(response).await;
        assert_eq!(page.limit, MAX_HISTORY_LIMIT);
        assert_eq!(page.messages.len(), 6);
    }
}
