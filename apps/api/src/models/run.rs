use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::recommendation::Recommendations;
use crate::models::scoring::{MatchResult, ScoreBreakdown};

/// The single condition that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TargetReached,
    MaxIterations,
    EarlyStopping,
    /// The revision step failed twice in the same round.
    RevisionFailed,
    Cancelled,
}

/// Pipeline stage a warning was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Matching,
    Recommending,
    Revising,
}

/// A recoverable failure that degraded a round without aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWarning {
    pub round: u32,
    pub stage: Stage,
    pub message: String,
}

/// One completed round. History is append-only and ordered by `round`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub round: u32,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub recommendations: Recommendations,
    pub resume_version: u32,
    pub resume_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub initial_score: f64,
    pub final_score: f64,
    pub improvement: f64,
    pub iteration_count: u32,
}

/// Final, immutable outcome of an optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub run_id: Uuid,
    /// Text of the best-scoring résumé version (the later one on ties).
    pub final_resume: String,
    pub final_score: f64,
    /// Round that produced `final_resume`, absent when no round completed.
    pub final_round: Option<u32>,
    /// Gaps and strengths of the round named by `final_round`.
    pub final_match: Option<MatchResult>,
    pub iterations: Vec<IterationRecord>,
    pub termination_reason: TerminationReason,
    pub metrics: RunMetrics,
    pub warnings: Vec<RunWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
