//! Semantic Matcher: pairs job elements with résumé elements via batched capability calls.
//!
//! Job elements are grouped by section and chunked into bounded batches. Batches run
//! concurrently up to `max_concurrent` and are all joined before any result is used.
//! A failed batch degrades its job elements to unmatched; only auth failures abort.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::prompts::{MATCH_PROMPT_TEMPLATE, MATCH_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::prompts::fill_template;
use crate::llm_client::{LlmError, LlmGateway, Validate};
use crate::models::element::{Element, ParsedDocument, SectionKind, Tag};
use crate::models::matching::{Relationship, SemanticMatch};

// ────────────────────────────────────────────────────────────────────────────
// Wire schema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JobPayload<'a> {
    id: usize,
    text: &'a str,
    section: &'static str,
    tags: Vec<Tag>,
}

#[derive(Debug, Serialize)]
struct ResumePayload<'a> {
    id: usize,
    text: &'a str,
    section: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBatchMatches {
    pub matches: Vec<RawMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMatch {
    pub job_id: usize,
    pub resume_id: Option<usize>,
    pub strength: f64,
    pub relationship: Relationship,
}

impl Validate for RawBatchMatches {
    fn validate(&self) -> Result<(), String> {
        for (i, m) in self.matches.iter().enumerate() {
            if !m.strength.is_finite() || !(0.0..=1.0).contains(&m.strength) {
                return Err(format!("matches[{i}].strength {} outside [0, 1]", m.strength));
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Batching
// ────────────────────────────────────────────────────────────────────────────

/// A set of job elements (by document-order index) from one section.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub section: SectionKind,
    pub job_ids: Vec<usize>,
}

/// A batch whose elements were degraded to unmatched.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub section: SectionKind,
    pub job_elements: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// One entry per job element, in job document order.
    pub matches: Vec<SemanticMatch>,
    pub failures: Vec<BatchFailure>,
}

/// Groups job elements by section and splits each group into chunks of `batch_size`.
pub fn plan_batches(job: &ParsedDocument, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut next_id = 0;
    for section in &job.sections {
        let ids: Vec<usize> = (next_id..next_id + section.elements.len()).collect();
        next_id += section.elements.len();
        for chunk in ids.chunks(batch_size) {
            batches.push(Batch {
                section: section.kind,
                job_ids: chunk.to_vec(),
            });
        }
    }
    batches
}

// ────────────────────────────────────────────────────────────────────────────
// Matcher
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SemanticMatcher {
    gateway: Arc<LlmGateway>,
    batch_size: usize,
    max_concurrent: usize,
    min_strength: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    resume_id: usize,
    strength: f64,
    relationship: Relationship,
}

impl SemanticMatcher {
    pub fn new(
        gateway: Arc<LlmGateway>,
        batch_size: usize,
        max_concurrent: usize,
        min_strength: f64,
    ) -> Self {
        Self {
            gateway,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
            min_strength,
        }
    }

    /// Matches every job element against the résumé. Returns one `SemanticMatch` per job
    /// element; scoring must not start until this returns.
    pub async fn match_documents(
        &self,
        job: &ParsedDocument,
        resume: &ParsedDocument,
    ) -> Result<MatchOutcome, AppError> {
        let job_elements: Vec<&Element> = job.elements().collect();
        let resume_elements: Vec<&Element> = resume.elements().collect();

        if resume_elements.is_empty() {
            return Ok(MatchOutcome {
                matches: job_elements
                    .into_iter()
                    .map(|e| SemanticMatch::unmatched(e.clone()))
                    .collect(),
                failures: Vec::new(),
            });
        }

        let resume_json = serde_json::to_string(
            &resume_elements
                .iter()
                .enumerate()
                .map(|(id, e)| ResumePayload {
                    id,
                    text: &e.text,
                    section: e.section.as_str(),
                })
                .collect::<Vec<_>>(),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize résumé elements: {e}")))?;

        let batches = plan_batches(job, self.batch_size);
        info!(
            "Matching {} job elements against {} résumé elements in {} batches",
            job_elements.len(),
            resume_elements.len(),
            batches.len()
        );

        let job_ref = &job_elements;
        let resume_ref = resume_json.as_str();
        let settled: Vec<(Batch, Result<RawBatchMatches, LlmError>)> = stream::iter(batches)
            .map(|batch| async move {
                let result = self.run_batch(&batch, job_ref, resume_ref).await;
                (batch, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut best: Vec<Option<Candidate>> = vec![None; job_elements.len()];
        let mut failures = Vec::new();

        for (batch, result) in settled {
            let checked = result.and_then(|raw| check_ids(&batch, raw, resume_elements.len()));
            match checked {
                Ok(raw) => {
                    for m in raw.matches {
                        self.consider(&mut best[m.job_id], &m, &resume_elements);
                    }
                }
                Err(e) if e.is_auth() => return Err(AppError::from_llm("semantic matching", e)),
                Err(e) => {
                    warn!(
                        "Matching batch for section '{}' failed; {} elements degraded to gaps: {}",
                        batch.section.as_str(),
                        batch.job_ids.len(),
                        e
                    );
                    failures.push(BatchFailure {
                        section: batch.section,
                        job_elements: batch.job_ids.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let matches = job_elements
            .iter()
            .zip(best)
            .map(|(job_element, candidate)| match candidate {
                Some(c) => SemanticMatch {
                    job_element: (*job_element).clone(),
                    resume_element: Some(resume_elements[c.resume_id].clone()),
                    strength: c.strength,
                    relationship: c.relationship,
                },
                None => SemanticMatch::unmatched((*job_element).clone()),
            })
            .collect();

        Ok(MatchOutcome { matches, failures })
    }

    async fn run_batch(
        &self,
        batch: &Batch,
        job_elements: &[&Element],
        resume_json: &str,
    ) -> Result<RawBatchMatches, LlmError> {
        let job_json = serde_json::to_string(
            &batch
                .job_ids
                .iter()
                .map(|&id| JobPayload {
                    id,
                    text: &job_elements[id].text,
                    section: job_elements[id].section.as_str(),
                    tags: job_elements[id].tags.iter().copied().collect(),
                })
                .collect::<Vec<_>>(),
        )?;

        let prompt = fill_template(
            MATCH_PROMPT_TEMPLATE,
            &[("job_json", job_json.as_str()), ("resume_json", resume_json)],
        );
        self.gateway.call_json(&prompt, MATCH_SYSTEM).await
    }

    /// Keeps the better of the current best and `m`: higher strength first, then the
    /// candidate appearing earlier in the résumé.
    fn consider(&self, slot: &mut Option<Candidate>, m: &RawMatch, resume: &[&Element]) {
        let Some(resume_id) = m.resume_id else {
            return;
        };
        if m.relationship == Relationship::Unrelated || m.strength < self.min_strength {
            return;
        }
        let candidate = Candidate {
            resume_id,
            strength: m.strength,
            relationship: m.relationship,
        };
        let better = match slot {
            None => true,
            Some(current) => match candidate.strength.partial_cmp(&current.strength) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => {
                    (resume[candidate.resume_id].position, candidate.resume_id)
                        < (resume[current.resume_id].position, current.resume_id)
                }
                _ => false,
            },
        };
        if better {
            *slot = Some(candidate);
        }
    }
}

/// Rejects replies that reference job elements outside the batch or unknown résumé elements.
fn check_ids(batch: &Batch, raw: RawBatchMatches, resume_len: usize) -> Result<RawBatchMatches, LlmError> {
    for m in &raw.matches {
        if !batch.job_ids.contains(&m.job_id) {
            return Err(LlmError::Schema(format!(
                "job_id {} is not part of this batch",
                m.job_id
            )));
        }
        if let Some(rid) = m.resume_id {
            if rid >= resume_len {
                return Err(LlmError::Schema(format!("resume_id {rid} does not exist")));
            }
        }
    }
    Ok(raw)
}
