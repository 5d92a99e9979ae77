use serde::{Deserialize, Serialize};

use crate::models::element::Element;
use crate::models::scoring::Dimension;

/// How a résumé element relates to the job element it was paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Exact,
    Synonym,
    Related,
    Unrelated,
}

/// Pairing of one job element to zero or one résumé elements. Lives for a single round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub job_element: Element,
    pub resume_element: Option<Element>,
    /// 0.0 – 1.0
    pub strength: f64,
    pub relationship: Relationship,
}

impl SemanticMatch {
    pub fn unmatched(job_element: Element) -> Self {
        Self {
            job_element,
            resume_element: None,
            strength: 0.0,
            relationship: Relationship::Unrelated,
        }
    }

    /// Resolves the match into a scorer-facing element with its dimension.
    pub fn tagged(&self) -> TaggedElement {
        TaggedElement {
            element: self.job_element.clone(),
            dimension: self.job_element.dimension(),
            matched: self.resume_element.clone(),
            strength: self.strength,
            relationship: self.relationship,
        }
    }
}

/// A job element enriched with its resolved dimension after matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedElement {
    pub element: Element,
    pub dimension: Dimension,
    pub matched: Option<Element>,
    pub strength: f64,
    pub relationship: Relationship,
}

impl TaggedElement {
    /// True when the pairing clears `floor` and is not marked unrelated.
    pub fn is_adequate(&self, floor: f64) -> bool {
        self.matched.is_some() && self.relationship != Relationship::Unrelated && self.strength >= floor
    }
}
