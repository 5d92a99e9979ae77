use serde::{Deserialize, Serialize};

use crate::models::element::Element;
use crate::models::scoring::Dimension;

/// One actionable suggestion tied to the job element that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub element: Element,
    pub dimension: Dimension,
    /// Gap importance for priority/optional items, strength contribution for rewording items.
    pub weight: f64,
    pub guidance: String,
    /// Existing résumé text the suggestion builds on. Only set for rewording items.
    pub resume_evidence: Option<String>,
}

/// Three disjoint ordered suggestion lists plus round metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendations {
    pub priority: Vec<Suggestion>,
    pub optional: Vec<Suggestion>,
    pub rewording: Vec<Suggestion>,
    pub summary: String,
    pub iteration_round: u32,
    pub current_score: f64,
    pub target_score: f64,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.optional.is_empty() && self.rewording.is_empty()
    }
}
