pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::engine::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/parse", post(handlers::handle_parse))
        .route("/api/v1/match", post(handlers::handle_match))
        .route("/api/v1/optimize", post(handlers::handle_optimize))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::watch;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::Config;
    use crate::engine::config::EngineSettings;
    use crate::engine::orchestrator::Orchestrator;
    use crate::engine::reviser::LlmReviser;
    use crate::engine::testing::{fast_gateway, FakeCapability};
    use crate::vault::{DocumentVault, InMemoryVault, ResumeSection};

    async fn app(fake: FakeCapability) -> (Router, Uuid) {
        let gateway = fast_gateway(fake.into_backend());
        let mut config = Config::from_lookup(|key| {
            (key == "ANTHROPIC_API_KEY").then(|| "sk-test".to_string())
        })
        .unwrap();
        config.engine = EngineSettings {
            base_delay_ms: 1,
            llm_summary: false,
            ..EngineSettings::default()
        };
        let orchestrator = Orchestrator::new(
            gateway.clone(),
            Arc::new(LlmReviser::new(gateway)),
            config.engine.clone(),
        );

        let vault = Arc::new(InMemoryVault::default());
        let resume_id = Uuid::new_v4();
        vault
            .insert(
                resume_id,
                vec![ResumeSection {
                    section_type: "skills".to_string(),
                    content: "skills: Rust, Go".to_string(),
                    position: 0,
                }],
            )
            .await;
        let vault: Arc<dyn DocumentVault> = vault;

        let (_tx, shutdown) = watch::channel(false);
        let state = AppState {
            config,
            orchestrator,
            vault: Some(vault),
            shutdown,
        };
        (build_router(state), resume_id)
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = app(FakeCapability::new()).await;
        let (status, body) = send(router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "fitloop");
    }

    #[tokio::test]
    async fn test_parse_returns_document() {
        let (router, _) = app(FakeCapability::new()).await;
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/parse",
            Some(json!({"text": "skills: Rust, Kafka", "role": "job"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "job");
        assert_eq!(body["sections"][0]["elements"][1]["text"], "Kafka");
    }

    #[tokio::test]
    async fn test_parse_empty_text_is_bad_request() {
        let (router, _) = app(FakeCapability::new()).await;
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/parse",
            Some(json!({"text": "  ", "role": "resume"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_match_uses_vault_resume() {
        let (router, resume_id) = app(FakeCapability::new()).await;
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/match",
            Some(json!({"job_text": "skills: Rust, Go, Kafka", "resume_id": resume_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match_result"]["gaps"].as_array().unwrap().len(), 1);
        assert_eq!(body["match_result"]["gaps"][0]["element"]["text"], "Kafka");
    }

    #[tokio::test]
    async fn test_optimize_runs_to_termination() {
        let (router, _) = app(FakeCapability::new()).await;
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/optimize",
            Some(json!({
                "job_text": "skills: Rust, Go",
                "resume_text": "skills: Rust, Go",
                "config": {"target_score": 0.9}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["termination_reason"], "target_reached");
        assert_eq!(body["iterations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_optimize_invalid_config_lists_fields() {
        let (router, _) = app(FakeCapability::new()).await;
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/optimize",
            Some(json!({
                "job_text": "skills: Rust",
                "resume_text": "skills: Rust",
                "config": {"max_iterations": 0, "target_score": 2.0}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_CONFIG");
        assert_eq!(body["error"]["fields"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_capability_maps_to_bad_gateway() {
        let (router, _) = app(FakeCapability::new().unauthorized()).await;
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/optimize",
            Some(json!({"job_text": "skills: Rust", "resume_text": "skills: Rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "LLM_UNAUTHORIZED");
    }
}
