//! Axum route handlers for the optimization engine.

use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::config::OptimizationOverrides;
use crate::engine::orchestrator::{CancelSignal, Evaluation};
use crate::errors::AppError;
use crate::models::element::{DocumentRole, ParsedDocument};
use crate::models::run::OptimizationResult;
use crate::state::AppState;
use crate::vault::resolve_resume_text;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub text: String,
    pub role: DocumentRole,
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub job_text: String,
    pub resume_text: Option<String>,
    pub resume_id: Option<Uuid>,
    #[serde(default)]
    pub config: OptimizationOverrides,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/parse
///
/// Runs the Parser Stage alone; useful for inspecting extraction.
pub async fn handle_parse(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParsedDocument>, AppError> {
    let doc = state.orchestrator.parser().parse(&request.text, request.role).await?;
    Ok(Json((*doc).clone()))
}

/// POST /api/v1/match
///
/// One scoring pass over the submitted résumé: match result, recommendations, themes.
pub async fn handle_match(
    State(state): State<AppState>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<Evaluation>, AppError> {
    if request.job_text.trim().is_empty() {
        return Err(AppError::Validation("job_text cannot be empty".to_string()));
    }
    let resume_text =
        resolve_resume_text(state.vault.as_deref(), request.resume_text, request.resume_id).await?;
    let config = state.config.optimization.merged(&request.config);

    let evaluation = state
        .orchestrator
        .evaluate_once(&request.job_text, &resume_text, &config)
        .await?;
    Ok(Json(evaluation))
}

/// POST /api/v1/optimize
///
/// Full multi-round optimization. Server shutdown cancels the run between transitions.
pub async fn handle_optimize(
    State(state): State<AppState>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizationResult>, AppError> {
    if request.job_text.trim().is_empty() {
        return Err(AppError::Validation("job_text cannot be empty".to_string()));
    }
    let resume_text =
        resolve_resume_text(state.vault.as_deref(), request.resume_text, request.resume_id).await?;
    let config = state.config.optimization.merged(&request.config);

    let result = state
        .orchestrator
        .run(
            &request.job_text,
            &resume_text,
            &config,
            CancelSignal::new(state.shutdown.clone()),
        )
        .await?;
    Ok(Json(result))
}
