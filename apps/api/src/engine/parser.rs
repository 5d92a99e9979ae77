//! Parser Stage: turns raw job or résumé text into a validated `ParsedDocument`.
//!
//! Extraction is delegated to the external capability with a fixed schema. Offsets,
//! normalization and confidences are resolved locally so the document is deterministic
//! for a given capability reply. Results are cached by a hash of `(role, text)`.

use std::collections::BTreeSet;
use std::sync::Arc;

use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, info};

use crate::engine::prompts::{EXTRACTION_PROMPT_TEMPLATE, EXTRACTION_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::cache::content_hash;
use crate::llm_client::prompts::fill_template;
use crate::llm_client::{LlmGateway, Validate};
use crate::models::element::{
    normalize, DocumentRole, Element, ParsedDocument, ParsedSection, Position, SectionKind, Tag,
};

/// Confidence assigned to a section when the capability reports none.
pub const DEFAULT_SECTION_CONFIDENCE: f64 = 0.5;
const PARSE_CACHE_CAPACITY: u64 = 256;

// ────────────────────────────────────────────────────────────────────────────
// Extraction schema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawExtraction {
    pub sections: Vec<RawSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSection {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawElement {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub context: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub confidence: Option<f64>,
}

impl Validate for RawExtraction {
    fn validate(&self) -> Result<(), String> {
        if self.sections.iter().all(|s| s.elements.is_empty()) {
            return Err("extraction returned no elements".to_string());
        }
        for (si, section) in self.sections.iter().enumerate() {
            if section.name.trim().is_empty() {
                return Err(format!("sections[{si}].name is empty"));
            }
            for (ei, element) in section.elements.iter().enumerate() {
                if element.text.trim().is_empty() {
                    return Err(format!("sections[{si}].elements[{ei}].text is empty"));
                }
                if let Some(c) = element.confidence {
                    if !(0.0..=1.0).contains(&c) {
                        return Err(format!(
                            "sections[{si}].elements[{ei}].confidence {c} outside [0, 1]"
                        ));
                    }
                }
                if let (Some(start), Some(end)) = (element.start, element.end) {
                    if start > end {
                        return Err(format!(
                            "sections[{si}].elements[{ei}] has start {start} > end {end}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Parser
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ParserStage {
    gateway: Arc<LlmGateway>,
    cache: Cache<String, Arc<ParsedDocument>>,
}

impl ParserStage {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self {
            gateway,
            cache: Cache::new(PARSE_CACHE_CAPACITY),
        }
    }

    /// Parses `text` as a job posting or résumé. Identical `(text, role)` pairs are
    /// served from cache without another capability call.
    pub async fn parse(&self, text: &str, role: DocumentRole) -> Result<Arc<ParsedDocument>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::Validation(format!("{} text cannot be empty", role.as_str())));
        }

        let key = content_hash(&[role.as_str(), text]);
        if let Some(doc) = self.cache.get(&key).await {
            debug!("Parse cache hit for {} ({})", role.as_str(), &key[..12]);
            return Ok(doc);
        }

        let prompt = fill_template(
            EXTRACTION_PROMPT_TEMPLATE,
            &[("role", role.as_str()), ("text", text)],
        );
        let raw: RawExtraction = self
            .gateway
            .call_json(&prompt, EXTRACTION_SYSTEM)
            .await
            .map_err(|e| AppError::from_llm(&format!("{} parsing failed", role.as_str()), e))?;

        let doc = Arc::new(build_document(raw, text, role, key.clone()));
        info!(
            "Parsed {}: {} sections, {} elements",
            role.as_str(),
            doc.sections.len(),
            doc.element_count()
        );
        self.cache.insert(key, doc.clone()).await;
        Ok(doc)
    }
}

/// Converts a validated extraction into a document. Sections with the same kind are merged
/// in first-seen order.
pub fn build_document(
    raw: RawExtraction,
    source: &str,
    role: DocumentRole,
    content_hash: String,
) -> ParsedDocument {
    let mut sections: Vec<(SectionKind, Vec<Element>, Vec<f64>)> = Vec::new();

    for raw_section in raw.sections {
        let kind = SectionKind::from_label(&raw_section.name);
        let idx = match sections.iter().position(|(k, _, _)| *k == kind) {
            Some(idx) => idx,
            None => {
                sections.push((kind, Vec::new(), Vec::new()));
                sections.len() - 1
            }
        };

        for raw_element in raw_section.elements {
            if let Some(c) = raw_element.confidence {
                sections[idx].2.push(c);
            }
            sections[idx].1.push(build_element(raw_element, source, kind));
        }
    }

    ParsedDocument {
        role,
        sections: sections
            .into_iter()
            .filter(|(_, elements, _)| !elements.is_empty())
            .map(|(kind, elements, confidences)| ParsedSection {
                kind,
                elements,
                confidence: section_confidence(&confidences),
            })
            .collect(),
        content_hash,
    }
}

fn build_element(raw: RawElement, source: &str, section: SectionKind) -> Element {
    let text = raw.text.trim().to_string();
    let position = resolve_position(source, &text, raw.start, raw.end);
    let context = raw
        .context
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| surrounding_line(source, position).to_string());
    let tags: BTreeSet<Tag> = raw.tags.iter().filter_map(|t| Tag::from_label(t)).collect();

    Element {
        normalized_text: normalize(&text),
        text,
        tags,
        context,
        position,
        section,
    }
}

/// Mean of the reported confidences, or the conservative default when none were reported.
pub fn section_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return DEFAULT_SECTION_CONFIDENCE;
    }
    confidences.iter().sum::<f64>() / confidences.len() as f64
}

/// Trusts reported offsets only if they point at the element's text; otherwise searches
/// the source case-insensitively. Unlocatable elements are placed at the end of the source.
fn resolve_position(source: &str, text: &str, start: Option<usize>, end: Option<usize>) -> Position {
    if let (Some(start), Some(end)) = (start, end) {
        if let Some(slice) = source.get(start..end) {
            if slice.to_lowercase() == text.to_lowercase() {
                return Position { start, end };
            }
        }
    }

    if let Some(start) = source.find(text) {
        return Position { start, end: start + text.len() };
    }
    if let Some((start, end)) = find_ignore_case(source, text) {
        return Position { start, end };
    }

    Position { start: source.len(), end: source.len() }
}

/// Case-insensitive search that reports byte offsets into `source` itself. Lowercasing
/// can change a character's byte length, so offsets are never taken from a lowered copy.
fn find_ignore_case(source: &str, needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }
    source.char_indices().find_map(|(start, _)| {
        let mut matched = 0;
        for (offset, c) in source[start..].char_indices() {
            for lower in c.to_lowercase() {
                if needle.get(matched) != Some(&lower) {
                    return None;
                }
                matched += 1;
            }
            if matched == needle.len() {
                return Some((start, start + offset + c.len_utf8()));
            }
        }
        None
    })
}

fn surrounding_line(source: &str, position: Position) -> &str {
    let start = position.start.min(source.len());
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = source[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(source.len());
    source[line_start..line_end].trim()
}
