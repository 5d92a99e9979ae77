//! Iteration Controller: drives the parse → match → score → recommend → revise loop.
//!
//! A run is an explicit `RunState` value threaded through the phase machine
//! `Initializing → Scoring → Evaluating → Revising → Scoring … → Terminated`.
//! Every transition consumes the previous state and returns the next one; the
//! iteration history only ever grows by appending in `Evaluating`.
//!
//! The cancellation signal is checked before every transition, never mid-batch,
//! so a cancelled run still reports a consistent history.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::config::{EngineSettings, OptimizationConfig};
use crate::engine::matcher::{MatchOutcome, SemanticMatcher};
use crate::engine::parser::ParserStage;
use crate::engine::recommender::RecommendationGenerator;
use crate::engine::reviser::ResumeReviser;
use crate::engine::scorer::{FitScorer, WeightedFitScorer};
use crate::engine::themes::{extract_themes, Theme, ThemeSet};
use crate::errors::AppError;
use crate::llm_client::LlmGateway;
use crate::models::element::{DocumentRole, ParsedDocument};
use crate::models::recommendation::Recommendations;
use crate::models::run::{
    IterationRecord, OptimizationResult, RunMetrics, RunWarning, Stage, TerminationReason,
};
use crate::models::scoring::MatchResult;

/// Attempts per round for the revision step (one retry).
const REVISION_ATTEMPTS: u32 = 2;

// ────────────────────────────────────────────────────────────────────────────
// Cancellation
// ────────────────────────────────────────────────────────────────────────────

/// External cancellation flag, backed by a `watch` channel. The default never fires.
#[derive(Clone, Default)]
pub struct CancelSignal(Option<watch::Receiver<bool>>);

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(Some(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Run state
// ────────────────────────────────────────────────────────────────────────────

pub struct RoundOutcome {
    pub result: MatchResult,
    pub recommendations: Recommendations,
}

pub enum Phase {
    Initializing,
    Scoring,
    Evaluating(Box<RoundOutcome>),
    Revising(Box<Recommendations>),
    Terminated(TerminationReason),
}

/// One résumé version. Version 1 is the submitted text.
#[derive(Clone)]
pub struct ResumeVersion {
    pub number: u32,
    pub text: String,
    pub parsed: Option<Arc<ParsedDocument>>,
}

struct BestVersion {
    round: u32,
    score: f64,
    text: String,
    result: MatchResult,
}

pub struct RunData {
    job: Option<Arc<ParsedDocument>>,
    themes: ThemeSet,
    resume: ResumeVersion,
    history: Vec<IterationRecord>,
    best: Option<BestVersion>,
    stalled_rounds: u32,
    warnings: Vec<RunWarning>,
}

pub struct RunState {
    pub phase: Phase,
    pub data: RunData,
}

impl RunState {
    fn new(resume_text: &str) -> Self {
        Self {
            phase: Phase::Initializing,
            data: RunData {
                job: None,
                themes: ThemeSet::default(),
                resume: ResumeVersion {
                    number: 1,
                    text: resume_text.to_string(),
                    parsed: None,
                },
                history: Vec::new(),
                best: None,
                stalled_rounds: 0,
                warnings: Vec::new(),
            },
        }
    }
}

struct RunContext<'a> {
    job_text: &'a str,
    config: &'a OptimizationConfig,
}

/// A single scoring pass without revision.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub match_result: MatchResult,
    pub recommendations: Recommendations,
    pub themes: Vec<Theme>,
    pub warnings: Vec<RunWarning>,
}

/// Decides whether the run ends after a round, in priority order target → budget → stall.
///
/// The stall counter grows while a round improves on the best prior round by less than
/// `min_improvement`, and resets otherwise. Returns the reason (if any) and the new counter.
pub fn check_termination(
    score: f64,
    round: u32,
    best_prior: Option<f64>,
    stalled_rounds: u32,
    config: &OptimizationConfig,
) -> (Option<TerminationReason>, u32) {
    let stalled_rounds = match best_prior {
        Some(best) if score - best < config.min_improvement => stalled_rounds + 1,
        _ => 0,
    };
    let reason = if score >= config.target_score {
        Some(TerminationReason::TargetReached)
    } else if round >= config.max_iterations {
        Some(TerminationReason::MaxIterations)
    } else if stalled_rounds >= config.early_stopping_rounds {
        Some(TerminationReason::EarlyStopping)
    } else {
        None
    };
    (reason, stalled_rounds)
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Orchestrator {
    parser: ParserStage,
    matcher: SemanticMatcher,
    scorer: Arc<dyn FitScorer>,
    recommender: RecommendationGenerator,
    reviser: Arc<dyn ResumeReviser>,
    settings: EngineSettings,
}

impl Orchestrator {
    pub fn new(gateway: Arc<LlmGateway>, reviser: Arc<dyn ResumeReviser>, settings: EngineSettings) -> Self {
        let summary_gateway = settings.llm_summary.then(|| gateway.clone());
        Self {
            parser: ParserStage::new(gateway.clone()),
            matcher: SemanticMatcher::new(
                gateway,
                settings.batch_size,
                settings.max_concurrent_batches,
                settings.min_match_strength,
            ),
            scorer: Arc::new(WeightedFitScorer {
                min_match_strength: settings.min_match_strength,
            }),
            recommender: RecommendationGenerator::new(
                settings.priority_threshold,
                settings.rewording_threshold,
                summary_gateway,
            ),
            reviser,
            settings,
        }
    }

    pub fn parser(&self) -> &ParserStage {
        &self.parser
    }

    /// Runs the full optimization loop. Fatal errors (invalid config, rejected credentials,
    /// unparseable inputs, scoring errors) abort with `Err`; everything else ends in an
    /// `OptimizationResult` carrying its termination reason and warnings.
    pub async fn run(
        &self,
        job_text: &str,
        resume_text: &str,
        config: &OptimizationConfig,
        cancel: CancelSignal,
    ) -> Result<OptimizationResult, AppError> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let ctx = RunContext { job_text, config };
        info!("Optimization run {} started (target {:.2})", run_id, config.target_score);

        let mut state = RunState::new(resume_text);
        loop {
            if let Phase::Terminated(reason) = state.phase {
                return Ok(assemble(run_id, started_at, reason, state.data));
            }
            state = if cancel.is_cancelled() {
                info!("Optimization run {} cancelled", run_id);
                RunState {
                    phase: Phase::Terminated(TerminationReason::Cancelled),
                    data: state.data,
                }
            } else {
                match self.step(state, &ctx).await {
                    Ok(next) => next,
                    Err(e) => {
                        error!("Optimization run {} aborted: {}", run_id, e);
                        return Err(e);
                    }
                }
            };
        }
    }

    /// One Scoring + Evaluating pass over the submitted résumé, with no revision.
    pub async fn evaluate_once(
        &self,
        job_text: &str,
        resume_text: &str,
        config: &OptimizationConfig,
    ) -> Result<Evaluation, AppError> {
        config.validate()?;
        let job = self.parser.parse(job_text, DocumentRole::Job).await?;
        let resume = self.parser.parse(resume_text, DocumentRole::Resume).await?;
        let themes = self.themes_for(&job);
        let (match_result, recommendations, warnings) =
            self.score_round(&job, &themes, &resume, config, 1).await?;
        Ok(Evaluation {
            match_result,
            recommendations,
            themes: themes.themes,
            warnings,
        })
    }

    async fn step(&self, state: RunState, ctx: &RunContext<'_>) -> Result<RunState, AppError> {
        let RunState { phase, data } = state;
        match phase {
            Phase::Initializing => self.initialize(data, ctx).await,
            Phase::Scoring => self.score_current(data, ctx).await,
            Phase::Evaluating(outcome) => Ok(evaluate(data, *outcome, ctx.config)),
            Phase::Revising(recommendations) => self.revise(data, *recommendations, ctx).await,
            Phase::Terminated(reason) => Ok(RunState {
                phase: Phase::Terminated(reason),
                data,
            }),
        }
    }

    /// The job is parsed once for the whole run. Failure to parse either input is fatal.
    async fn initialize(&self, data: RunData, ctx: &RunContext<'_>) -> Result<RunState, AppError> {
        let job = self.parser.parse(ctx.job_text, DocumentRole::Job).await?;
        let resume = self.parser.parse(&data.resume.text, DocumentRole::Resume).await?;
        let themes = self.themes_for(&job);
        info!(
            "Run initialized: {} job elements, {} résumé elements, {} themes",
            job.element_count(),
            resume.element_count(),
            themes.themes.len()
        );

        Ok(RunState {
            phase: Phase::Scoring,
            data: RunData {
                job: Some(job),
                themes,
                resume: ResumeVersion {
                    parsed: Some(resume),
                    ..data.resume
                },
                ..data
            },
        })
    }

    async fn score_current(&self, mut data: RunData, ctx: &RunContext<'_>) -> Result<RunState, AppError> {
        let (Some(job), Some(resume)) = (data.job.clone(), data.resume.parsed.clone()) else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "scoring reached before initialization"
            )));
        };
        let round = data.history.len() as u32 + 1;
        let (result, recommendations, warnings) = self
            .score_round(&job, &data.themes, &resume, ctx.config, round)
            .await?;
        data.warnings.extend(warnings);

        Ok(RunState {
            phase: Phase::Evaluating(Box::new(RoundOutcome {
                result,
                recommendations,
            })),
            data,
        })
    }

    /// Applies the round's recommendations through the reviser, retrying once.
    /// A revised résumé that fails to parse counts as a failed revision.
    async fn revise(
        &self,
        mut data: RunData,
        recommendations: Recommendations,
        ctx: &RunContext<'_>,
    ) -> Result<RunState, AppError> {
        let round = data.history.len() as u32;

        for attempt in 1..=REVISION_ATTEMPTS {
            match self.revise_and_parse(ctx.job_text, &data.resume.text, &recommendations).await {
                Ok((text, parsed)) => {
                    info!(
                        "Round {}: résumé revised to version {}",
                        round,
                        data.resume.number + 1
                    );
                    data.resume = ResumeVersion {
                        number: data.resume.number + 1,
                        text,
                        parsed: Some(parsed),
                    };
                    return Ok(RunState {
                        phase: Phase::Scoring,
                        data,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        "Round {}: revision attempt {}/{} failed: {}",
                        round, attempt, REVISION_ATTEMPTS, e
                    );
                    data.warnings.push(RunWarning {
                        round,
                        stage: Stage::Revising,
                        message: format!("revision attempt {attempt} failed: {e}"),
                    });
                }
            }
        }

        Ok(RunState {
            phase: Phase::Terminated(TerminationReason::RevisionFailed),
            data,
        })
    }

    async fn revise_and_parse(
        &self,
        job_text: &str,
        resume_text: &str,
        recommendations: &Recommendations,
    ) -> Result<(String, Arc<ParsedDocument>), AppError> {
        let text = self
            .reviser
            .revise(job_text, resume_text, recommendations)
            .await?;
        let parsed = self.parser.parse(&text, DocumentRole::Resume).await?;
        Ok((text, parsed))
    }

    /// Matcher → Scorer → Recommendation Generator for one résumé version.
    async fn score_round(
        &self,
        job: &ParsedDocument,
        themes: &ThemeSet,
        resume: &ParsedDocument,
        config: &OptimizationConfig,
        round: u32,
    ) -> Result<(MatchResult, Recommendations, Vec<RunWarning>), AppError> {
        let MatchOutcome { matches, failures } = self.matcher.match_documents(job, resume).await?;
        let mut warnings: Vec<RunWarning> = failures
            .into_iter()
            .map(|f| RunWarning {
                round,
                stage: Stage::Matching,
                message: format!(
                    "{} job elements in section '{}' degraded to gaps: {}",
                    f.job_elements,
                    f.section.as_str(),
                    f.message
                ),
            })
            .collect();

        let result = self.scorer.score(&matches, themes, config)?;
        let mut recommendations = self
            .recommender
            .recommend(&result, round, config.target_score);
        if let Some(message) = self.recommender.polish_summary(&mut recommendations).await? {
            warnings.push(RunWarning {
                round,
                stage: Stage::Recommending,
                message,
            });
        }
        Ok((result, recommendations, warnings))
    }

    fn themes_for(&self, job: &ParsedDocument) -> ThemeSet {
        extract_themes(
            job,
            self.settings.theme_count,
            self.settings.bounded_theme_boost(),
        )
    }
}

/// Appends the round's record and decides between revising and terminating.
fn evaluate(mut data: RunData, outcome: RoundOutcome, config: &OptimizationConfig) -> RunState {
    let round = data.history.len() as u32 + 1;
    let score = outcome.result.overall_score;
    let best_prior = data.best.as_ref().map(|b| b.score);
    let (reason, stalled_rounds) =
        check_termination(score, round, best_prior, data.stalled_rounds, config);
    data.stalled_rounds = stalled_rounds;

    info!(
        "Round {}: score {:.3} (target {:.2}, {} gaps, {} strengths)",
        round,
        score,
        config.target_score,
        outcome.result.gaps.len(),
        outcome.result.strengths.len()
    );

    data.history.push(IterationRecord {
        round,
        score,
        score_breakdown: outcome.result.score_breakdown.clone(),
        recommendations: outcome.recommendations.clone(),
        resume_version: data.resume.number,
        resume_hash: data
            .resume
            .parsed
            .as_ref()
            .map(|p| p.content_hash.clone())
            .unwrap_or_default(),
    });
    if best_prior.map_or(true, |best| score >= best) {
        data.best = Some(BestVersion {
            round,
            score,
            text: data.resume.text.clone(),
            result: outcome.result,
        });
    }

    let phase = match reason {
        Some(reason) => Phase::Terminated(reason),
        None => Phase::Revising(Box::new(outcome.recommendations)),
    };
    RunState { phase, data }
}

/// The single exit point: builds the result from the full history.
fn assemble(
    run_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    reason: TerminationReason,
    data: RunData,
) -> OptimizationResult {
    let initial_score = data.history.first().map(|r| r.score).unwrap_or(0.0);
    let (final_score, final_resume, final_round, final_match) = match data.best {
        Some(best) => (best.score, best.text, Some(best.round), Some(best.result)),
        None => (0.0, data.resume.text, None, None),
    };
    let iteration_count = data.history.len() as u32;
    info!(
        "Optimization run {} finished: {:?} after {} rounds, final score {:.3}",
        run_id, reason, iteration_count, final_score
    );

    OptimizationResult {
        run_id,
        final_resume,
        final_score,
        final_round,
        final_match,
        iterations: data.history,
        termination_reason: reason,
        metrics: RunMetrics {
            initial_score,
            final_score,
            improvement: if iteration_count > 0 { final_score - initial_score } else { 0.0 },
            iteration_count,
        },
        warnings: data.warnings,
        started_at,
        finished_at: Utc::now(),
    }
}
