use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::element::Element;
use crate::models::matching::Relationship;

/// One scoring axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Keywords,
    Skills,
    Attributes,
    Experience,
    Level,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Keywords,
        Dimension::Skills,
        Dimension::Attributes,
        Dimension::Experience,
        Dimension::Level,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Keywords => "keywords",
            Dimension::Skills => "skills",
            Dimension::Attributes => "attributes",
            Dimension::Experience => "experience",
            Dimension::Level => "level",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown dimension '{s}'"))
    }
}

/// Per-dimension scores plus the weighted overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub dimensions: BTreeMap<Dimension, f64>,
    pub overall_score: f64,
}

/// A job element with no adequate résumé match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub element: Element,
    pub dimension: Dimension,
    /// Base salience × theme boost.
    pub importance: f64,
    /// Overall score this gap would add if it were fully matched.
    pub potential_gain: f64,
    pub theme_rank: Option<usize>,
}

/// A job element with an adequate résumé match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strength {
    pub element: Element,
    pub matched: Element,
    pub dimension: Dimension,
    pub strength: f64,
    pub relationship: Relationship,
    /// This element's share of the overall score.
    pub contribution: f64,
    pub theme_rank: Option<usize>,
}

/// Output of one scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub overall_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub gaps: Vec<Gap>,
    pub strengths: Vec<Strength>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_from_str_roundtrips_names() {
        for dim in Dimension::ALL {
            assert_eq!(dim.as_str().parse::<Dimension>().unwrap(), dim);
        }
        assert!("seniority".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_dimension_serde_is_snake_case() {
        let json = serde_json::to_string(&Dimension::Experience).unwrap();
        assert_eq!(json, r#""experience""#);
    }
}
