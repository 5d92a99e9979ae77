//! Recommendation Generator: turns a round's gaps and strengths into actionable suggestions.
//!
//! Gaps become `priority` or `optional` items; weakly phrased strengths become `rewording`
//! items. Guidance only ever names the triggering job element or the résumé's own wording,
//! so no suggestion introduces a qualification that is not already in play.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::prompts::{SUMMARY_PROMPT_TEMPLATE, SUMMARY_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::prompts::{fill_template, GROUNDING_INSTRUCTION};
use crate::llm_client::{LlmGateway, Validate};
use crate::models::matching::Relationship;
use crate::models::recommendation::{Recommendations, Suggestion};
use crate::models::scoring::{Dimension, Gap, MatchResult, Strength};

/// Number of priority items the summary leads with.
const SUMMARY_ITEMS: usize = 3;
const MAX_SUMMARY_CHARS: usize = 1200;

#[derive(Debug, Deserialize)]
struct SummaryReply {
    summary: String,
}

impl Validate for SummaryReply {
    fn validate(&self) -> Result<(), String> {
        let len = self.summary.trim().chars().count();
        if len == 0 {
            return Err("summary is empty".to_string());
        }
        if len > MAX_SUMMARY_CHARS {
            return Err(format!("summary is {len} chars, limit {MAX_SUMMARY_CHARS}"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SummaryItem<'a> {
    item: &'a str,
    guidance: &'a str,
}

#[derive(Clone)]
pub struct RecommendationGenerator {
    priority_threshold: f64,
    rewording_threshold: f64,
    /// Present when the summary should be polished by the external capability.
    gateway: Option<Arc<LlmGateway>>,
}

impl RecommendationGenerator {
    pub fn new(priority_threshold: f64, rewording_threshold: f64, gateway: Option<Arc<LlmGateway>>) -> Self {
        Self {
            priority_threshold,
            rewording_threshold,
            gateway,
        }
    }

    /// Builds the round's recommendations with the deterministic summary.
    pub fn recommend(&self, result: &MatchResult, round: u32, target_score: f64) -> Recommendations {
        let deficit = (target_score - result.overall_score).max(0.0);
        let mut priority = Vec::new();
        let mut optional = Vec::new();
        let mut covered = 0.0;

        for gap in dedup_gaps(&result.gaps) {
            let suggestion = gap_suggestion(&gap);
            if gap.importance >= self.priority_threshold || covered < deficit {
                covered += gap.potential_gain;
                priority.push(suggestion);
            } else {
                optional.push(suggestion);
            }
        }

        let mut seen = HashSet::new();
        let rewording = result
            .strengths
            .iter()
            .filter(|s| self.needs_rewording(s))
            .filter(|s| seen.insert(s.element.normalized_text.clone()))
            .map(rewording_suggestion)
            .collect();

        let mut recommendations = Recommendations {
            priority,
            optional,
            rewording,
            summary: String::new(),
            iteration_round: round,
            current_score: result.overall_score,
            target_score,
        };
        recommendations.summary = build_summary(&recommendations);
        recommendations
    }

    fn needs_rewording(&self, strength: &Strength) -> bool {
        strength.strength < self.rewording_threshold
            || matches!(strength.relationship, Relationship::Synonym | Relationship::Related)
    }

    /// Replaces the deterministic summary with a capability-written one when enabled.
    ///
    /// Returns a warning message when the call failed and the deterministic summary was kept.
    /// Rejected credentials are fatal.
    pub async fn polish_summary(&self, recommendations: &mut Recommendations) -> Result<Option<String>, AppError> {
        let Some(gateway) = &self.gateway else {
            return Ok(None);
        };
        if recommendations.priority.is_empty() && recommendations.rewording.is_empty() {
            return Ok(None);
        }

        let priority_json = items_json(&recommendations.priority)?;
        let rewording_json = items_json(&recommendations.rewording)?;
        let score = format!("{:.2}", recommendations.current_score);
        let target = format!("{:.2}", recommendations.target_score);
        let prompt = fill_template(
            SUMMARY_PROMPT_TEMPLATE,
            &[
                ("grounding_instruction", GROUNDING_INSTRUCTION),
                ("score", score.as_str()),
                ("target", target.as_str()),
                ("priority_json", priority_json.as_str()),
                ("rewording_json", rewording_json.as_str()),
            ],
        );

        match gateway.call_json::<SummaryReply>(&prompt, SUMMARY_SYSTEM).await {
            Ok(reply) => {
                recommendations.summary = reply.summary.trim().to_string();
                Ok(None)
            }
            Err(e) if e.is_auth() => Err(AppError::from_llm("summary", e)),
            Err(e) => {
                warn!("Summary generation failed, keeping deterministic summary: {e}");
                Ok(Some(format!("summary generation failed: {e}")))
            }
        }
    }
}

fn items_json(items: &[Suggestion]) -> Result<String, AppError> {
    let items: Vec<SummaryItem<'_>> = items
        .iter()
        .take(SUMMARY_ITEMS)
        .map(|s| SummaryItem {
            item: &s.element.text,
            guidance: &s.guidance,
        })
        .collect();
    serde_json::to_string_pretty(&items)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize summary items: {e}")))
}

/// Collapses repeated mentions of the same requirement; the first (most important) wins
/// and absorbs the score the duplicates would add.
fn dedup_gaps(gaps: &[Gap]) -> Vec<Gap> {
    let mut merged: Vec<Gap> = Vec::new();
    for gap in gaps {
        match merged
            .iter_mut()
            .find(|g| g.element.normalized_text == gap.element.normalized_text)
        {
            Some(existing) => existing.potential_gain += gap.potential_gain,
            None => merged.push(gap.clone()),
        }
    }
    merged
}

fn gap_suggestion(gap: &Gap) -> Suggestion {
    let text = &gap.element.text;
    let guidance = match gap.dimension {
        Dimension::Skills => format!(
            "If you have worked with {text}, name it explicitly in your skills section and show where you used it."
        ),
        Dimension::Experience => format!(
            "If your background includes {text}, state it plainly in your experience section with its scope."
        ),
        Dimension::Level => format!(
            "If you hold {text}, make it visible near the top of your résumé."
        ),
        Dimension::Attributes => format!(
            "If {text} describes how you work, back it with a concrete example from an existing role."
        ),
        Dimension::Keywords => format!(
            "If {text} applies to your past work, use the posting's wording \"{text}\" where you describe it."
        ),
    };
    Suggestion {
        element: gap.element.clone(),
        dimension: gap.dimension,
        weight: gap.importance,
        guidance,
        resume_evidence: None,
    }
}

fn rewording_suggestion(strength: &Strength) -> Suggestion {
    Suggestion {
        element: strength.element.clone(),
        dimension: strength.dimension,
        weight: strength.contribution,
        guidance: format!(
            "Your résumé says \"{}\"; where accurate, phrase it as \"{}\" to mirror the posting.",
            strength.matched.text, strength.element.text
        ),
        resume_evidence: Some(strength.matched.text.clone()),
    }
}

/// Builds a short human-readable synthesis, leading with the top priority items.
fn build_summary(recs: &Recommendations) -> String {
    let score = (recs.current_score * 100.0).round() as u32;
    let target = (recs.target_score * 100.0).round() as u32;
    let top = |items: &[Suggestion]| -> String {
        items
            .iter()
            .take(SUMMARY_ITEMS)
            .map(|s| s.element.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let rewording_note = if recs.rewording.is_empty() {
        String::new()
    } else {
        format!(
            " Reword {} existing item(s) to mirror the posting's language.",
            recs.rewording.len()
        )
    };

    if recs.is_empty() {
        format!("Strong fit ({score}/100). The résumé already covers what the posting emphasizes.")
    } else if recs.current_score >= recs.target_score {
        format!("Target reached ({score}/100).{rewording_note}")
    } else if !recs.priority.is_empty() {
        format!(
            "Fit {score}/100 against a target of {target}. Address first: {}.{rewording_note}",
            top(&recs.priority)
        )
    } else if !recs.optional.is_empty() {
        format!(
            "Fit {score}/100 against a target of {target}. Consider: {}.{rewording_note}",
            top(&recs.optional)
        )
    } else {
        format!("Fit {score}/100 against a target of {target}.{rewording_note}")
    }
}
