//! In-crate fakes for the external capability, shared by engine tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::engine::config::MAX_THEME_BOOST;
use crate::engine::prompts::{EXTRACTION_SYSTEM, MATCH_SYSTEM, REVISION_SYSTEM, SUMMARY_SYSTEM};
use crate::engine::themes::{extract_themes, ThemeSet};
use crate::llm_client::retry::RetryPolicy;
use crate::llm_client::{LlmError, LlmGateway, TextUnderstanding};
use crate::models::element::{
    normalize, DocumentRole, Element, ParsedDocument, ParsedSection, Position, SectionKind, Tag,
};
use crate::models::matching::Relationship;

type Reply = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Answers every call with a closure over the prompt and counts calls.
pub struct CountingBackend {
    reply: Box<Reply>,
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn new<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextUnderstanding for CountingBackend {
    async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(prompt)
    }
}

/// Gateway with millisecond backoff so retry paths stay fast in tests.
pub fn fast_gateway(backend: Arc<dyn TextUnderstanding>) -> Arc<LlmGateway> {
    Arc::new(LlmGateway::new(
        backend,
        RetryPolicy::new(3, Duration::from_millis(1), 2.0),
        Duration::from_secs(5),
        64,
    ))
}

/// Builds an extraction reply. Each entry is a section name and a comma-separated item list.
pub fn extraction_reply(sections: &[(&str, &str)]) -> String {
    let sections: Vec<Value> = sections
        .iter()
        .map(|(name, items)| {
            let elements: Vec<Value> = split_items(items)
                .map(|text| json!({"text": text, "tags": tags_for_section(name), "confidence": 0.9}))
                .collect();
            json!({"name": name, "elements": elements})
        })
        .collect();
    json!({ "sections": sections }).to_string()
}

pub fn element(text: &str, section: SectionKind, tags: &[Tag], start: usize) -> Element {
    Element {
        text: text.to_string(),
        normalized_text: normalize(text),
        tags: tags.iter().copied().collect::<BTreeSet<_>>(),
        context: text.to_string(),
        position: Position { start, end: start + text.len() },
        section,
    }
}

/// Builds a parsed document directly. Every element is tagged as a technical skill.
pub fn document(role: DocumentRole, sections: &[(SectionKind, &str)]) -> ParsedDocument {
    let mut offset = 0;
    let sections = sections
        .iter()
        .map(|(kind, items)| ParsedSection {
            kind: *kind,
            elements: split_items(items)
                .map(|text| {
                    let e = element(text, *kind, &[Tag::TechnicalSkill], offset);
                    offset += text.len() + 2;
                    e
                })
                .collect(),
            confidence: 0.9,
        })
        .collect();
    ParsedDocument {
        role,
        sections,
        content_hash: "test".to_string(),
    }
}

fn split_items(items: &str) -> impl Iterator<Item = &str> {
    items.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn tags_for_section(name: &str) -> Vec<&'static str> {
    let name = name.to_lowercase();
    let tag = if name.contains("level") || name.contains("seniority") {
        "seniority"
    } else if name.contains("soft") || name.contains("attribute") {
        "soft-skill"
    } else if name.contains("experience") {
        "experience"
    } else if name.contains("keyword") || name.contains("domain") {
        "concept"
    } else if name.contains("education") {
        "education"
    } else {
        "technical-skill"
    };
    vec![tag]
}

// ────────────────────────────────────────────────────────────────────────────
// FakeCapability
// ────────────────────────────────────────────────────────────────────────────

/// A deterministic stand-in for the text-understanding service.
///
/// Documents are written as `section: item, item` lines. Matching pairs items whose
/// lowercase text is equal (exact, 1.0) plus any registered partial pairs.
#[derive(Default)]
pub struct FakeCapability {
    failing_sections: HashSet<String>,
    partial: HashMap<String, (String, f64, Relationship)>,
    unauthorized: bool,
    summary_fails: bool,
    calls: AtomicUsize,
}

impl FakeCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matching batches for this job section fail with a transient error on every attempt.
    pub fn failing_section(mut self, section: &str) -> Self {
        self.failing_sections.insert(section.to_string());
        self
    }

    /// Pairs `job` with `resume` at the given strength instead of leaving it unmatched.
    pub fn partial(mut self, job: &str, resume: &str, strength: f64, relationship: Relationship) -> Self {
        self.partial.insert(
            job.to_lowercase(),
            (resume.to_lowercase(), strength, relationship),
        );
        self
    }

    /// Every call is rejected as unauthenticated.
    pub fn unauthorized(mut self) -> Self {
        self.unauthorized = true;
        self
    }

    pub fn failing_summary(mut self) -> Self {
        self.summary_fails = true;
        self
    }

    pub fn into_backend(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn extract(&self, prompt: &str) -> Result<String, LlmError> {
        let document = prompt
            .split_once("\nDOCUMENT:\n")
            .map(|(_, doc)| doc)
            .unwrap_or_default();
        let sections: Vec<(&str, &str)> = document
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(name, items)| (name.trim(), items))
            .collect();
        Ok(extraction_reply(&sections))
    }

    fn match_batch(&self, prompt: &str) -> Result<String, LlmError> {
        let jobs = payload_after(prompt, "JOB ELEMENTS:\n");
        let resumes = payload_after(prompt, "RESUME ELEMENTS:\n");

        if jobs.iter().any(|j| {
            j["section"]
                .as_str()
                .is_some_and(|s| self.failing_sections.contains(s))
        }) {
            return Err(LlmError::Api { status: 503, message: "unavailable".to_string() });
        }

        let mut matches = Vec::new();
        for job in &jobs {
            let job_id = &job["id"];
            let job_text = job["text"].as_str().unwrap_or_default().to_lowercase();
            let mut found = false;
            for resume in &resumes {
                let resume_text = resume["text"].as_str().unwrap_or_default().to_lowercase();
                let hit = if resume_text == job_text {
                    Some((1.0, Relationship::Exact))
                } else {
                    self.partial
                        .get(&job_text)
                        .filter(|(target, _, _)| *target == resume_text)
                        .map(|(_, strength, rel)| (*strength, *rel))
                };
                if let Some((strength, relationship)) = hit {
                    found = true;
                    matches.push(json!({
                        "job_id": job_id,
                        "resume_id": resume["id"],
                        "strength": strength,
                        "relationship": relationship,
                    }));
                }
            }
            if !found {
                matches.push(json!({
                    "job_id": job_id,
                    "resume_id": null,
                    "strength": 0.0,
                    "relationship": "unrelated",
                }));
            }
        }
        Ok(json!({ "matches": matches }).to_string())
    }

    fn revise(&self, prompt: &str) -> Result<String, LlmError> {
        let resume = prompt
            .split_once("CURRENT RÉSUMÉ:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nReturn the full revised résumé"))
            .map(|(resume, _)| resume)
            .unwrap_or_default();
        Ok(json!({ "revised_resume": resume }).to_string())
    }
}

fn payload_after(prompt: &str, marker: &str) -> Vec<Value> {
    prompt
        .split_once(marker)
        .and_then(|(_, rest)| rest.lines().next())
        .and_then(|line| serde_json::from_str::<Vec<Value>>(line).ok())
        .unwrap_or_default()
}

#[async_trait]
impl TextUnderstanding for FakeCapability {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unauthorized {
            return Err(LlmError::Api { status: 401, message: "invalid x-api-key".to_string() });
        }
        match system {
            EXTRACTION_SYSTEM => self.extract(prompt),
            MATCH_SYSTEM => self.match_batch(prompt),
            SUMMARY_SYSTEM if self.summary_fails => Ok("I cannot help with that.".to_string()),
            SUMMARY_SYSTEM => Ok(json!({"summary": "Lead with the must-fix items."}).to_string()),
            REVISION_SYSTEM => self.revise(prompt),
            _ => Err(LlmError::EmptyContent),
        }
    }
}

/// Extracts themes from a posting made of exactly these elements, in order.
pub fn extract_test_themes(elements: &[Element], n: usize) -> ThemeSet {
    let doc = ParsedDocument {
        role: DocumentRole::Job,
        sections: elements
            .iter()
            .map(|e| ParsedSection {
                kind: e.section,
                elements: vec![e.clone()],
                confidence: 0.9,
            })
            .collect(),
        content_hash: "test".to_string(),
    };
    extract_themes(&doc, n, MAX_THEME_BOOST)
}
