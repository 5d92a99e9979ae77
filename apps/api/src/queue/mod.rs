//! Job Queue worker: one optimization run per dequeued posting.
//!
//! Jobs arrive as JSON on a Redis list (`BRPOP`); each processed job pushes a `JobSummary`
//! onto the result list (`LPUSH`), carrying an error code and message when the run failed.
//! Payloads without a readable `job_id` are logged and skipped. Nothing is persisted here;
//! the consumer of the result list owns storage.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::config::{OptimizationConfig, OptimizationOverrides};
use crate::engine::orchestrator::{CancelSignal, Orchestrator};
use crate::errors::AppError;
use crate::models::run::{OptimizationResult, TerminationReason};
use crate::models::scoring::Dimension;
use crate::vault::{resolve_resume_text, DocumentVault};

/// Seconds a `BRPOP` blocks before the shutdown flag is re-checked.
const POLL_TIMEOUT_SECS: u64 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeJob {
    pub job_id: Uuid,
    pub job_text: String,
    pub resume_text: Option<String>,
    pub resume_id: Option<Uuid>,
    #[serde(default)]
    pub config: OptimizationOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

/// The MatchResult-shaped summary handed back for persistence.
/// A failed job has no run, no termination reason and carries `error` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub run_id: Option<Uuid>,
    pub final_score: f64,
    pub matched_skills: Vec<SkillImportance>,
    pub missing_skills: Vec<SkillImportance>,
    pub gap_suggestions: Vec<String>,
    pub recommendations: Vec<String>,
    pub termination_reason: Option<TerminationReason>,
    pub iteration_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobSummary {
    pub fn failed(job_id: Uuid, err: &AppError) -> Self {
        Self {
            job_id,
            run_id: None,
            final_score: 0.0,
            matched_skills: Vec::new(),
            missing_skills: Vec::new(),
            gap_suggestions: Vec::new(),
            recommendations: Vec::new(),
            termination_reason: None,
            iteration_count: 0,
            error: Some(JobError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Only the id is needed to answer a job whose payload is otherwise unusable.
#[derive(Deserialize)]
struct JobHeader {
    job_id: Uuid,
}

/// What goes onto the result list for one payload. A failure is reported against the
/// payload's `job_id`; without one there is nobody to answer and `None` is returned.
pub fn result_entry(payload: &str, outcome: Result<JobSummary, AppError>) -> Option<JobSummary> {
    match outcome {
        Ok(summary) => Some(summary),
        Err(e) => {
            let header: JobHeader = serde_json::from_str(payload).ok()?;
            Some(JobSummary::failed(header.job_id, &e))
        }
    }
}

/// Condenses a run into the summary shape. Skills come from the best-scoring version's
/// match, recommendations from the round that produced it.
pub fn summarize(job_id: Uuid, result: &OptimizationResult) -> JobSummary {
    let (matched_skills, missing_skills) = match &result.final_match {
        Some(m) => (
            m.strengths
                .iter()
                .filter(|s| s.dimension == Dimension::Skills)
                .map(|s| SkillImportance {
                    name: s.element.text.clone(),
                    importance: s.contribution,
                })
                .collect(),
            m.gaps
                .iter()
                .filter(|g| g.dimension == Dimension::Skills)
                .map(|g| SkillImportance {
                    name: g.element.text.clone(),
                    importance: g.importance,
                })
                .collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };

    let final_recommendations = result
        .final_round
        .and_then(|round| result.iterations.iter().find(|r| r.round == round))
        .map(|r| &r.recommendations);
    let (gap_suggestions, recommendations) = match final_recommendations {
        Some(recs) => (
            recs.priority
                .iter()
                .chain(recs.optional.iter())
                .map(|s| s.guidance.clone())
                .collect(),
            std::iter::once(recs.summary.clone())
                .chain(recs.rewording.iter().map(|s| s.guidance.clone()))
                .collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };

    JobSummary {
        job_id,
        run_id: Some(result.run_id),
        final_score: result.final_score,
        matched_skills,
        missing_skills,
        gap_suggestions,
        recommendations,
        termination_reason: Some(result.termination_reason),
        iteration_count: result.metrics.iteration_count,
        error: None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Processing
// ────────────────────────────────────────────────────────────────────────────

/// Turns one raw queue payload into a summary. Independent of Redis.
#[derive(Clone)]
pub struct JobProcessor {
    orchestrator: Orchestrator,
    vault: Option<Arc<dyn DocumentVault>>,
    defaults: OptimizationConfig,
}

impl JobProcessor {
    pub fn new(
        orchestrator: Orchestrator,
        vault: Option<Arc<dyn DocumentVault>>,
        defaults: OptimizationConfig,
    ) -> Self {
        Self {
            orchestrator,
            vault,
            defaults,
        }
    }

    pub async fn process(&self, payload: &str, cancel: CancelSignal) -> Result<JobSummary, AppError> {
        let job: OptimizeJob = serde_json::from_str(payload)
            .map_err(|e| AppError::Validation(format!("malformed job payload: {e}")))?;
        info!("Processing optimization job {}", job.job_id);

        let resume_text =
            resolve_resume_text(self.vault.as_deref(), job.resume_text, job.resume_id).await?;
        let config = self.defaults.merged(&job.config);
        let result = self
            .orchestrator
            .run(&job.job_text, &resume_text, &config, cancel)
            .await?;
        Ok(summarize(job.job_id, &result))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis worker
// ────────────────────────────────────────────────────────────────────────────

pub struct QueueWorker {
    client: redis::Client,
    processor: JobProcessor,
    job_key: String,
    result_key: String,
}

impl QueueWorker {
    pub fn new(client: redis::Client, processor: JobProcessor, job_key: String, result_key: String) -> Self {
        Self {
            client,
            processor,
            job_key,
            result_key,
        }
    }

    /// Consumes jobs until `shutdown` flips to true. In-flight runs see the same flag as
    /// their cancellation signal.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!("Queue worker listening on '{}'", self.job_key);
        while !*shutdown.borrow() {
            if let Err(e) = self.poll_once(&shutdown).await {
                error!("Queue worker error: {e}; reconnecting in {}s", RECONNECT_DELAY.as_secs());
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
        info!("Queue worker stopped");
    }

    async fn poll_once(&self, shutdown: &watch::Receiver<bool>) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        while !*shutdown.borrow() {
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(&self.job_key)
                .arg(POLL_TIMEOUT_SECS)
                .query_async(&mut conn)
                .await?;
            let Some((_, payload)) = popped else {
                continue;
            };

            let outcome = self
                .processor
                .process(&payload, CancelSignal::new(shutdown.clone()))
                .await;
            if let Err(e) = &outcome {
                error!("Optimization job failed: {e}");
            }
            let Some(summary) = result_entry(&payload, outcome) else {
                warn!("Skipping job without a readable job_id");
                continue;
            };

            let body = serde_json::to_string(&summary).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to serialize job summary: {e}"))
            })?;
            redis::cmd("LPUSH")
                .arg(&self.result_key)
                .arg(body)
                .query_async::<_, ()>(&mut conn)
                .await?;
            match &summary.error {
                Some(err) => info!("Job {} reported as failed ({})", summary.job_id, err.code),
                None => info!(
                    "Job {} finished: score {:.3} ({:?})",
                    summary.job_id, summary.final_score, summary.termination_reason
                ),
            }
        }
        Ok(())
    }
}
