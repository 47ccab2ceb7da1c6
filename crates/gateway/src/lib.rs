//! HTTP API gateway for convmem.
//!
//! Exposes the memory orchestrator over REST: chat, login/logout, a memory
//! inspection endpoint and the paginated chat log.
//!
//! Built on Axum.

pub mod api;
pub mod reply;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use convmem_config::AppConfig;
use convmem_providers::{LlmSummarizer, OpenAiCompatProvider};

pub use api::{ApiState, SharedApiState};
pub use reply::{Reply, Responder};

/// Build the full router with middleware.
///
/// Layers applied:
/// - Permissive CORS (any origin, any method)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    api::api_router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and run until Ctrl-C.
///
/// One provider serves both the chat replies and the summarizer.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    if !provider.is_configured() {
        tracing::warn!("No API key configured; replies will use the fallback text");
    }
    let summarizer = Arc::new(LlmSummarizer::from_config(provider.clone(), &config.provider));
    let memory = Arc::new(convmem_memory::open_orchestrator(&config, summarizer).await?);
    let responder = Responder::from_config(provider, &config.provider);

    let state = Arc::new(ApiState {
        memory: memory.clone(),
        responder,
    });
    let app = build_router(state);

    info!(addr = %addr, model = %config.provider.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    memory.close().await;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use convmem_config::MemoryConfig;
    use convmem_memory::{InMemoryDurableStore, InMemoryHotStore, MemoryOrchestrator};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> SharedApiState {
        let provider = Arc::new(
            OpenAiCompatProvider::new("openai", "http://127.0.0.1:1", None, Duration::from_secs(1))
                .unwrap(),
        );
        let summarizer = Arc::new(LlmSummarizer::new(provider.clone(), "m"));
        let memory = MemoryOrchestrator::new(
            Arc::new(InMemoryHotStore::new()),
            Arc::new(InMemoryDurableStore::new()),
            summarizer,
            MemoryConfig::default(),
        );
        Arc::new(ApiState {
            memory: Arc::new(memory),
            responder: Responder::new(provider, "m", 0.7),
        })
    }

    #[tokio::test]
    async fn root_is_healthy() {
        let app = build_router(test_state());
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: api::HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.provider, "openai");
        // No API key: reported unreachable without touching the network.
        assert!(!health.provider_reachable);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build_router(test_state());
        let message = "x".repeat(2 * 1024 * 1024);
        let body = format!(
            r#"{{"message":"{message}","user_id":"u","conversation_id":"c"}}"#
        );
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unconfigured_provider_still_answers() {
        let state = test_state();
        let app = build_router(state.clone());
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"message":"hello","user_id":"u","conversation_id":"c"}"#,
            ))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.memory.history("u", 0, 10).await.unwrap().total, 2);
    }
}
