//! Résumé revision: the injected step that applies recommendations to résumé text.
//!
//! The orchestrator never rewrites prose itself; it hands the current text and the
//! round's recommendations to a `ResumeReviser` and re-parses whatever comes back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::prompts::{REVISION_PROMPT_TEMPLATE, REVISION_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::prompts::{fill_template, GROUNDING_INSTRUCTION};
use crate::llm_client::{LlmGateway, Validate};
use crate::models::recommendation::{Recommendations, Suggestion};

#[async_trait]
pub trait ResumeReviser: Send + Sync {
    /// Returns the full revised résumé text.
    async fn revise(
        &self,
        job_text: &str,
        resume_text: &str,
        recommendations: &Recommendations,
    ) -> Result<String, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmReviser
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RevisionReply {
    revised_resume: String,
}

impl Validate for RevisionReply {
    fn validate(&self) -> Result<(), String> {
        if self.revised_resume.trim().is_empty() {
            return Err("revised_resume is empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RevisionItem<'a> {
    kind: &'static str,
    item: &'a str,
    guidance: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    resume_evidence: Option<&'a str>,
}

/// Revises through the external capability under the grounding instruction.
pub struct LlmReviser {
    gateway: Arc<LlmGateway>,
}

impl LlmReviser {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }
}

/// Revision bypasses the response cache: a retry after a rejected revision must produce a
/// fresh one, not replay the rejected text.
#[async_trait]
impl ResumeReviser for LlmReviser {
    async fn revise(
        &self,
        job_text: &str,
        resume_text: &str,
        recommendations: &Recommendations,
    ) -> Result<String, AppError> {
        let recommendations_json = revision_items_json(recommendations)?;
        let prompt = fill_template(
            REVISION_PROMPT_TEMPLATE,
            &[
                ("grounding_instruction", GROUNDING_INSTRUCTION),
                ("job_text", job_text),
                ("recommendations_json", recommendations_json.as_str()),
                ("resume_text", resume_text),
            ],
        );

        let reply: RevisionReply = self
            .gateway
            .call_json_uncached(&prompt, REVISION_SYSTEM)
            .await
            .map_err(|e| AppError::from_llm("revision", e))?;
        Ok(reply.revised_resume.trim().to_string())
    }
}

fn revision_items_json(recs: &Recommendations) -> Result<String, AppError> {
    let items: Vec<RevisionItem<'_>> = recs
        .priority
        .iter()
        .map(|s| revision_item("priority", s))
        .chain(recs.optional.iter().map(|s| revision_item("optional", s)))
        .chain(recs.rewording.iter().map(|s| revision_item("rewording", s)))
        .collect();
    serde_json::to_string_pretty(&items)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize recommendations: {e}")))
}

fn revision_item<'a>(kind: &'static str, s: &'a Suggestion) -> RevisionItem<'a> {
    RevisionItem {
        kind,
        item: &s.element.text,
        guidance: &s.guidance,
        resume_evidence: s.resume_evidence.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{fast_gateway, CountingBackend, FakeCapability};

    fn empty_recommendations() -> Recommendations {
        Recommendations {
            priority: vec![],
            optional: vec![],
            rewording: vec![],
            summary: String::new(),
            iteration_round: 1,
            current_score: 0.5,
            target_score: 0.8,
        }
    }

    #[tokio::test]
    async fn test_llm_reviser_returns_revised_text() {
        let reviser = LlmReviser::new(fast_gateway(FakeCapability::new().into_backend()));
        let revised = reviser
            .revise("skills: Rust", "skills: Rust, Go", &empty_recommendations())
            .await
            .unwrap();
        assert_eq!(revised, "skills: Rust, Go");
    }

    #[tokio::test]
    async fn test_prompt_carries_grounding_instruction() {
        let backend = CountingBackend::new(|prompt| {
            assert!(prompt.contains("Never invent qualifications"));
            Ok("{\"revised_resume\": \"new text\"}".to_string())
        });
        let reviser = LlmReviser::new(fast_gateway(backend.clone()));
        let revised = reviser
            .revise("job", "old text", &empty_recommendations())
            .await
            .unwrap();
        assert_eq!(revised, "new text");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_placeholders_in_user_text_are_sent_verbatim() {
        let backend = CountingBackend::new(|prompt| {
            assert!(prompt.contains("Write {resume_text} in your cover letter"));
            assert_eq!(prompt.matches("old text").count(), 1);
            Ok("{\"revised_resume\": \"new text\"}".to_string())
        });
        let reviser = LlmReviser::new(fast_gateway(backend.clone()));
        reviser
            .revise(
                "Write {resume_text} in your cover letter",
                "old text",
                &empty_recommendations(),
            )
            .await
            .unwrap();
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeated_revision_is_not_served_from_cache() {
        let backend = CountingBackend::new(|_prompt| Ok("{\"revised_resume\": \"new\"}".to_string()));
        let reviser = LlmReviser::new(fast_gateway(backend.clone()));
        for _ in 0..2 {
            reviser.revise("job", "old", &empty_recommendations()).await.unwrap();
        }
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_revision_is_rejected() {
        let backend = CountingBackend::new(|_prompt| Ok("{\"revised_resume\": \"  \"}".to_string()));
        let reviser = LlmReviser::new(fast_gateway(backend));
        let err = reviser
            .revise("job", "old", &empty_recommendations())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Parsing(_)));
    }
}
