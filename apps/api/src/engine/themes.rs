//! Theme Extractor: ranks job elements by salience and keeps the top `n`.
//!
//! Salience of a normalized element key is the summed emphasis of every section that
//! mentions it, plus a bonus for each additional distinct section. Themes only bias
//! weighting and ordering; they never decide whether an element is a gap.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::element::{Element, ParsedDocument, SectionKind};

/// Extra salience for each distinct section beyond the first that repeats an element.
const CROSS_SECTION_BONUS: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub element: Element,
    /// Normalized to [0, 1] against the most salient element of the posting.
    pub salience: f64,
    /// 1-based rank.
    pub rank: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeSet {
    pub themes: Vec<Theme>,
    #[serde(skip)]
    salience: HashMap<String, f64>,
    #[serde(skip)]
    max_boost: f64,
}

impl ThemeSet {
    /// Base salience of any job element in [0, 1]; unknown keys have zero salience.
    pub fn salience_of(&self, element: &Element) -> f64 {
        self.salience
            .get(&element.normalized_text)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn rank_of(&self, element: &Element) -> Option<usize> {
        self.themes
            .iter()
            .find(|t| t.element.normalized_text == element.normalized_text)
            .map(|t| t.rank)
    }

    /// Multiplicative boost in [1.0, max_boost]: rank 1 gets the full boost, later ranks
    /// decay linearly, non-themes get 1.0.
    pub fn boost_for(&self, element: &Element) -> f64 {
        let n = self.themes.len();
        match self.rank_of(element) {
            Some(rank) if n > 0 => {
                1.0 + (self.max_boost - 1.0) * (n + 1 - rank) as f64 / n as f64
            }
            _ => 1.0,
        }
    }
}

struct Tally<'a> {
    first: &'a Element,
    raw: f64,
    sections: BTreeSet<SectionKind>,
}

/// Returns the `n` most salient job elements, most salient first. Ties keep the element
/// that appears earlier in the posting.
pub fn extract_themes(job: &ParsedDocument, n: usize, max_boost: f64) -> ThemeSet {
    let mut order: Vec<String> = Vec::new();
    let mut tallies: HashMap<String, Tally<'_>> = HashMap::new();

    for element in job.elements() {
        let tally = tallies
            .entry(element.normalized_text.clone())
            .or_insert_with(|| {
                order.push(element.normalized_text.clone());
                Tally {
                    first: element,
                    raw: 0.0,
                    sections: BTreeSet::new(),
                }
            });
        tally.raw += element.section.emphasis();
        tally.sections.insert(element.section);
    }

    let raw_of = |t: &Tally<'_>| t.raw + CROSS_SECTION_BONUS * (t.sections.len() as f64 - 1.0);
    let max_raw = tallies.values().map(raw_of).fold(0.0_f64, f64::max);

    let salience: HashMap<String, f64> = tallies
        .iter()
        .map(|(key, t)| {
            let s = if max_raw > 0.0 { raw_of(t) / max_raw } else { 0.0 };
            (key.clone(), s)
        })
        .collect();

    let mut ranked: Vec<&Tally<'_>> = order.iter().filter_map(|k| tallies.get(k)).collect();
    ranked.sort_by(|a, b| {
        raw_of(*b)
            .partial_cmp(&raw_of(*a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first.position.cmp(&b.first.position))
    });

    let themes = ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, t)| Theme {
            element: t.first.clone(),
            salience: salience
                .get(&t.first.normalized_text)
                .copied()
                .unwrap_or(0.0),
            rank: i + 1,
        })
        .collect();

    ThemeSet {
        themes,
        salience,
        max_boost: max_boost.max(1.0),
    }
}
