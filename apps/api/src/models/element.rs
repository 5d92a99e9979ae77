//! Element model: normalized facts extracted from job postings and résumés.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::scoring::Dimension;

/// Which side of the comparison a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    Job,
    Resume,
}

impl DocumentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentRole::Job => "job",
            DocumentRole::Resume => "resume",
        }
    }
}

/// Taxonomy labels attached to an element by the extraction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tag {
    TechnicalSkill,
    Tool,
    SoftSkill,
    Attribute,
    Experience,
    Education,
    Certification,
    Seniority,
    Domain,
    Concept,
}

impl Tag {
    /// Maps a free-form label to a known tag. Unknown labels yield `None` and are dropped.
    pub fn from_label(label: &str) -> Option<Tag> {
        let label = label.trim().to_lowercase().replace(['_', ' '], "-");
        let tag = match label.as_str() {
            "technical-skill" | "hard-skill" | "skill" | "technology" | "language" | "framework" => {
                Tag::TechnicalSkill
            }
            "tool" | "platform" => Tag::Tool,
            "soft-skill" => Tag::SoftSkill,
            "attribute" | "trait" => Tag::Attribute,
            "experience" | "years-of-experience" => Tag::Experience,
            "education" | "degree" => Tag::Education,
            "certification" | "license" => Tag::Certification,
            "seniority" | "level" => Tag::Seniority,
            "domain" | "industry" => Tag::Domain,
            "concept" | "keyword" => Tag::Concept,
            _ => return None,
        };
        Some(tag)
    }
}

/// Source section an element was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Requirements,
    Qualifications,
    Responsibilities,
    Preferred,
    Skills,
    Experience,
    Education,
    Certifications,
    Summary,
    Other,
}

impl SectionKind {
    /// Maps a section heading (as named by the extraction call) to a section kind.
    pub fn from_label(label: &str) -> SectionKind {
        let label = label.trim().to_lowercase();
        if label.contains("nice") || label.contains("prefer") || label.contains("bonus") || label.contains("plus") {
            SectionKind::Preferred
        } else if label.contains("require") || label.contains("must") {
            SectionKind::Requirements
        } else if label.contains("qualif") {
            SectionKind::Qualifications
        } else if label.contains("responsib") || label.contains("duties") || label.contains("you will") {
            SectionKind::Responsibilities
        } else if label.contains("skill") || label.contains("tech") {
            SectionKind::Skills
        } else if label.contains("experience") || label.contains("employment") || label.contains("work") {
            SectionKind::Experience
        } else if label.contains("educat") {
            SectionKind::Education
        } else if label.contains("certif") || label.contains("licens") {
            SectionKind::Certifications
        } else if label.contains("summary") || label.contains("profile") || label.contains("about") {
            SectionKind::Summary
        } else {
            SectionKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Requirements => "requirements",
            SectionKind::Qualifications => "qualifications",
            SectionKind::Responsibilities => "responsibilities",
            SectionKind::Preferred => "preferred",
            SectionKind::Skills => "skills",
            SectionKind::Experience => "experience",
            SectionKind::Education => "education",
            SectionKind::Certifications => "certifications",
            SectionKind::Summary => "summary",
            SectionKind::Other => "other",
        }
    }

    /// How strongly a mention in this section signals that the posting cares about it.
    /// requirements=1.0 … preferred/nice-to-have=0.4
    pub fn emphasis(&self) -> f64 {
        match self {
            SectionKind::Requirements => 1.0,
            SectionKind::Qualifications => 0.9,
            SectionKind::Skills => 0.8,
            SectionKind::Responsibilities | SectionKind::Experience => 0.7,
            SectionKind::Education | SectionKind::Certifications => 0.6,
            SectionKind::Summary | SectionKind::Other => 0.5,
            SectionKind::Preferred => 0.4,
        }
    }
}

/// Byte offsets of an element's surface form in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

/// A normalized fact extracted from job or résumé text. Immutable once built by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub text: String,
    pub normalized_text: String,
    pub tags: BTreeSet<Tag>,
    pub context: String,
    pub position: Position,
    pub section: SectionKind,
}

impl Element {
    /// Resolves the scoring dimension this element counts toward.
    ///
    /// Precedence: level → experience → skills → attributes → keywords.
    pub fn dimension(&self) -> Dimension {
        let has = |t: Tag| self.tags.contains(&t);
        if has(Tag::Seniority) || has(Tag::Education) || has(Tag::Certification) {
            Dimension::Level
        } else if has(Tag::Experience) {
            Dimension::Experience
        } else if has(Tag::TechnicalSkill) || has(Tag::Tool) {
            Dimension::Skills
        } else if has(Tag::SoftSkill) || has(Tag::Attribute) {
            Dimension::Attributes
        } else {
            Dimension::Keywords
        }
    }
}

/// One source section of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSection {
    pub kind: SectionKind,
    pub elements: Vec<Element>,
    /// Mean element-level confidence reported by the extraction call, in [0, 1].
    pub confidence: f64,
}

/// Structured form of a job posting or résumé. A revised résumé yields a new document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub role: DocumentRole,
    pub sections: Vec<ParsedSection>,
    pub content_hash: String,
}

impl ParsedDocument {
    /// All elements in document order (section order, then extraction order).
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.sections.iter().flat_map(|s| s.elements.iter())
    }

    pub fn element_count(&self) -> usize {
        self.sections.iter().map(|s| s.elements.len()).sum()
    }
}

/// Builds the deterministic lookup key for an element's surface text:
/// lowercase, punctuation stripped (keeping `+` and `#`), whitespace collapsed,
/// and a light suffix stemmer applied per token.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '/' || c == '-' || c == ',')
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '+' || *c == '#')
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .map(|token| stem(&token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn stem(token: &str) -> String {
    let len = token.chars().count();
    if !token.is_ascii() {
        return token.to_string();
    }
    if len > 4 && token.ends_with("ies") {
        format!("{}y", &token[..token.len() - 3])
    } else if len > 5 && token.ends_with("ing") {
        token[..token.len() - 3].to_string()
    } else if len > 4 && token.ends_with("ed") && !token.ends_with("eed") {
        token[..token.len() - 2].to_string()
    } else if len > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}
