//! Scorer: weighted multi-dimensional fit scoring over a round's semantic matches.
//!
//! Pluggable behind `FitScorer`; the default `WeightedFitScorer` is pure and deterministic.
//!
//! Algorithm:
//! 1. Each job element resolves to one dimension and to a Strength (adequate match) or Gap.
//! 2. Element weight w = section emphasis × theme boost.
//! 3. dimension score = Σ(w × strength over Strengths) / Σ w, or a neutral 1.0 when the
//!    posting has no element in that dimension.
//! 4. overall = Σ weight[d] × score[d], clamped to [0, 1].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::engine::config::{check_weight_sum, OptimizationConfig};
use crate::engine::themes::ThemeSet;
use crate::errors::AppError;
use crate::models::matching::{SemanticMatch, TaggedElement};
use crate::models::scoring::{Dimension, Gap, MatchResult, ScoreBreakdown, Strength};

/// Score of a dimension the posting never mentions.
pub const NEUTRAL_DIMENSION_SCORE: f64 = 1.0;

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Carried by the orchestrator as `Arc<dyn FitScorer>`.
pub trait FitScorer: Send + Sync {
    fn score(
        &self,
        matches: &[SemanticMatch],
        themes: &ThemeSet,
        config: &OptimizationConfig,
    ) -> Result<MatchResult, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// WeightedFitScorer
// ────────────────────────────────────────────────────────────────────────────

pub struct WeightedFitScorer {
    /// Matches below this strength count as gaps.
    pub min_match_strength: f64,
}

impl FitScorer for WeightedFitScorer {
    fn score(
        &self,
        matches: &[SemanticMatch],
        themes: &ThemeSet,
        config: &OptimizationConfig,
    ) -> Result<MatchResult, AppError> {
        compute_weighted_fit(matches, themes, config, self.min_match_strength)
    }
}

struct Scored {
    tagged: TaggedElement,
    weight: f64,
}

fn compute_weighted_fit(
    matches: &[SemanticMatch],
    themes: &ThemeSet,
    config: &OptimizationConfig,
    floor: f64,
) -> Result<MatchResult, AppError> {
    check_weight_sum(&config.dimension_weights).map_err(AppError::Scoring)?;
    for m in matches {
        if !m.strength.is_finite() || !(0.0..=1.0).contains(&m.strength) {
            return Err(AppError::Scoring(format!(
                "match strength {} for '{}' outside [0, 1]",
                m.strength, m.job_element.text
            )));
        }
    }

    let scored: Vec<Scored> = matches
        .iter()
        .map(|m| Scored {
            weight: m.job_element.section.emphasis() * themes.boost_for(&m.job_element),
            tagged: m.tagged(),
        })
        .collect();

    let mut total_weight: BTreeMap<Dimension, f64> = BTreeMap::new();
    let mut earned: BTreeMap<Dimension, f64> = BTreeMap::new();
    for s in &scored {
        *total_weight.entry(s.tagged.dimension).or_default() += s.weight;
        if s.tagged.is_adequate(floor) {
            *earned.entry(s.tagged.dimension).or_default() += s.weight * s.tagged.strength;
        }
    }

    let mut dimensions = BTreeMap::new();
    for dim in config.dimension_weights.keys() {
        let score = match total_weight.get(dim) {
            Some(total) if *total > 0.0 => {
                (earned.get(dim).copied().unwrap_or(0.0) / total).clamp(0.0, 1.0)
            }
            _ => NEUTRAL_DIMENSION_SCORE,
        };
        dimensions.insert(*dim, score);
    }

    let overall_score = config
        .dimension_weights
        .iter()
        .map(|(dim, w)| w * dimensions.get(dim).copied().unwrap_or(NEUTRAL_DIMENSION_SCORE))
        .sum::<f64>()
        .clamp(0.0, 1.0);

    // Share of the overall score each element stands for, before normalization.
    let share = |s: &Scored| -> f64 {
        let dim_weight = config
            .dimension_weights
            .get(&s.tagged.dimension)
            .copied()
            .unwrap_or(0.0);
        match total_weight.get(&s.tagged.dimension) {
            Some(total) if *total > 0.0 => dim_weight * s.weight / total,
            _ => 0.0,
        }
    };

    let mut gaps = Vec::new();
    let mut strengths = Vec::new();
    for s in &scored {
        let theme_rank = themes.rank_of(&s.tagged.element);
        match (&s.tagged.matched, s.tagged.is_adequate(floor)) {
            (Some(matched), true) => strengths.push(Strength {
                element: s.tagged.element.clone(),
                matched: matched.clone(),
                dimension: s.tagged.dimension,
                strength: s.tagged.strength,
                relationship: s.tagged.relationship,
                contribution: share(s) * s.tagged.strength,
                theme_rank,
            }),
            _ => gaps.push(Gap {
                element: s.tagged.element.clone(),
                dimension: s.tagged.dimension,
                importance: themes.salience_of(&s.tagged.element) * themes.boost_for(&s.tagged.element),
                potential_gain: share(s),
                theme_rank,
            }),
        }
    }

    // Neutral dimensions hold score but no elements; rescale so contributions sum to overall.
    let raw_total: f64 = strengths.iter().map(|s| s.contribution).sum();
    if raw_total > 0.0 {
        let scale = overall_score / raw_total;
        for s in &mut strengths {
            s.contribution *= scale;
        }
    }

    gaps.sort_by(compare_gaps);
    strengths.sort_by(|a, b| {
        b.contribution
            .partial_cmp(&a.contribution)
            .unwrap_or(Ordering::Equal)
            .then(a.element.position.cmp(&b.element.position))
    });

    Ok(MatchResult {
        overall_score,
        score_breakdown: ScoreBreakdown {
            dimensions,
            overall_score,
        },
        gaps,
        strengths,
    })
}

/// Importance descending, then theme rank (themes first), then posting order.
fn compare_gaps(a: &Gap, b: &Gap) -> Ordering {
    b.importance
        .partial_cmp(&a.importance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.theme_rank, b.theme_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then(a.element.position.cmp(&b.element.position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{element, extract_test_themes};
    use crate::models::element::{Element, SectionKind, Tag};
    use crate::models::matching::Relationship;

    const FLOOR: f64 = 0.5;

    fn skill(text: &str, start: usize) -> Element {
        element(text, SectionKind::Requirements, &[Tag::TechnicalSkill], start)
    }

    fn matched(job: Element, strength: f64) -> SemanticMatch {
        SemanticMatch {
            resume_element: Some(job.clone()),
            job_element: job,
            strength,
            relationship: Relationship::Exact,
        }
    }

    fn score(matches: &[SemanticMatch], themes: &ThemeSet) -> MatchResult {
        WeightedFitScorer { min_match_strength: FLOOR }
            .score(matches, themes, &OptimizationConfig::default())
            .unwrap()
    }

    #[test]
    fn test_eight_of_ten_skills_matched() {
        let matches: Vec<SemanticMatch> = (0..10)
            .map(|i| {
                let e = skill(&format!("skill{i}"), i * 10);
                if i < 8 {
                    matched(e, 1.0)
                } else {
                    SemanticMatch::unmatched(e)
                }
            })
            .collect();
        let result = score(&matches, &ThemeSet::default());

        let skills = result.score_breakdown.dimensions[&Dimension::Skills];
        assert!((skills - 0.8).abs() < 1e-9);
        assert_eq!(result.gaps.len(), 2);
        assert_eq!(result.strengths.len(), 8);

        // Other dimensions are unmentioned and neutral.
        let expected = 0.35 * 0.8 + 0.65;
        assert!((result.overall_score - expected).abs() < 1e-9);
        assert!((result.gaps[0].potential_gain - 0.035).abs() < 1e-9);
    }

    #[test]
    fn test_eight_of_ten_skills_weighted_by_match_strength() {
        // Four matches at 0.8 and four at 0.9; the last two skills are missing.
        let matches: Vec<SemanticMatch> = (0..10)
            .map(|i| {
                let e = skill(&format!("skill{i}"), i * 10);
                match i {
                    0..=3 => matched(e, 0.8),
                    4..=7 => matched(e, 0.9),
                    _ => SemanticMatch::unmatched(e),
                }
            })
            .collect();
        let result = score(&matches, &ThemeSet::default());

        let skills = result.score_breakdown.dimensions[&Dimension::Skills];
        assert!((skills - 0.68).abs() < 1e-9);
        assert!((result.overall_score - (0.35 * 0.68 + 0.65)).abs() < 1e-9);
        assert_eq!(result.gaps.len(), 2);
        assert_eq!(result.strengths.len(), 8);

        // Stronger matches contribute more, in proportion to their strength.
        let top = &result.strengths[0];
        let bottom = &result.strengths[7];
        assert_eq!(top.strength, 0.9);
        assert_eq!(bottom.strength, 0.8);
        assert!((top.contribution / bottom.contribution - 0.9 / 0.8).abs() < 1e-9);
        let total: f64 = result.strengths.iter().map(|s| s.contribution).sum();
        assert!((total - result.overall_score).abs() < 1e-9);
    }

    #[test]
    fn test_unmentioned_dimension_is_neutral() {
        let matches = vec![SemanticMatch::unmatched(skill("Rust", 0))];
        let result = score(&matches, &ThemeSet::default());
        for dim in [Dimension::Keywords, Dimension::Attributes, Dimension::Experience, Dimension::Level] {
            assert_eq!(result.score_breakdown.dimensions[&dim], NEUTRAL_DIMENSION_SCORE);
        }
        assert_eq!(result.score_breakdown.dimensions[&Dimension::Skills], 0.0);
        assert!((result.overall_score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_empty_posting_scores_fully_neutral() {
        let result = score(&[], &ThemeSet::default());
        assert!((result.overall_score - 1.0).abs() < 1e-9);
        assert!(result.gaps.is_empty());
    }

    #[test]
    fn test_scores_stay_within_bounds() {
        let strengths = [0.0, 0.49, 0.5, 0.73, 1.0];
        let matches: Vec<SemanticMatch> = strengths
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                [
                    matched(skill(&format!("s{i}"), i), *s),
                    matched(
                        element(&format!("e{i}"), SectionKind::Experience, &[Tag::Experience], 100 + i),
                        *s,
                    ),
                ]
            })
            .collect();
        let result = score(&matches, &ThemeSet::default());
        assert!((0.0..=1.0).contains(&result.overall_score));
        for value in result.score_breakdown.dimensions.values() {
            assert!((0.0..=1.0).contains(value));
        }
    }

    #[test]
    fn test_below_floor_match_is_a_gap() {
        let matches = vec![matched(skill("Rust", 0), 0.3)];
        let result = score(&matches, &ThemeSet::default());
        assert_eq!(result.gaps.len(), 1);
        assert!(result.strengths.is_empty());
    }

    #[test]
    fn test_contributions_sum_to_overall() {
        let matches = vec![
            matched(skill("Rust", 0), 0.9),
            matched(element("5 years", SectionKind::Experience, &[Tag::Experience], 10), 0.6),
            SemanticMatch::unmatched(skill("Go", 20)),
        ];
        let result = score(&matches, &ThemeSet::default());
        let total: f64 = result.strengths.iter().map(|s| s.contribution).sum();
        assert!((total - result.overall_score).abs() < 1e-9);
        assert!(result.strengths[0].contribution >= result.strengths[1].contribution);
    }

    #[test]
    fn test_themed_element_dominates_its_dimension() {
        let rust = skill("Rust", 0);
        let go = element("Go", SectionKind::Requirements, &[Tag::TechnicalSkill], 10);
        let themes = extract_test_themes(&[rust.clone(), rust.clone(), go.clone()], 1);
        let result = score(
            &[matched(rust, 1.0), SemanticMatch::unmatched(go)],
            &themes,
        );
        assert!(result.score_breakdown.dimensions[&Dimension::Skills] > 0.5);
    }

    #[test]
    fn test_gaps_sorted_by_importance() {
        let rust = skill("Rust", 0);
        let go = skill("Go", 10);
        let themes = extract_test_themes(&[rust.clone(), go.clone(), go.clone()], 2);
        let result = score(
            &[SemanticMatch::unmatched(rust), SemanticMatch::unmatched(go)],
            &themes,
        );
        assert_eq!(result.gaps[0].element.text, "Go");
        assert!(result.gaps[0].importance > result.gaps[1].importance);
        assert_eq!(result.gaps[0].theme_rank, Some(1));
    }

    #[test]
    fn test_bad_weight_sum_is_a_scoring_error() {
        let mut config = OptimizationConfig::default();
        config.dimension_weights.insert(Dimension::Skills, 0.9);
        let err = WeightedFitScorer { min_match_strength: FLOOR }
            .score(&[], &ThemeSet::default(), &config)
            .unwrap_err();
        assert!(matches!(err, AppError::Scoring(_)));
    }

    #[test]
    fn test_out_of_range_strength_is_a_scoring_error() {
        let err = WeightedFitScorer { min_match_strength: FLOOR }
            .score(
                &[matched(skill("Rust", 0), 1.7)],
                &ThemeSet::default(),
                &OptimizationConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Scoring(_)));
    }
}
