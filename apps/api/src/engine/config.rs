//! Run configuration and engine tunables.
//!
//! `OptimizationConfig` is supplied once per run and never mutated; validation
//! collects every field-level violation before any round starts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, FieldError};
use crate::llm_client::retry::RetryPolicy;
use crate::models::scoring::Dimension;

/// Maximum distance from 1.0 tolerated for the dimension weight sum.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;
/// Upper bound of the multiplicative theme boost.
pub const MAX_THEME_BOOST: f64 = 1.5;

pub type DimensionWeights = BTreeMap<Dimension, f64>;

pub fn default_dimension_weights() -> DimensionWeights {
    BTreeMap::from([
        (Dimension::Keywords, 0.15),
        (Dimension::Skills, 0.35),
        (Dimension::Attributes, 0.10),
        (Dimension::Experience, 0.25),
        (Dimension::Level, 0.15),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub target_score: f64,
    pub max_iterations: u32,
    pub early_stopping_rounds: u32,
    pub min_improvement: f64,
    pub dimension_weights: DimensionWeights,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            target_score: 0.80,
            max_iterations: 5,
            early_stopping_rounds: 2,
            min_improvement: 0.01,
            dimension_weights: default_dimension_weights(),
        }
    }
}

impl OptimizationConfig {
    /// Validates every field, returning all violations at once.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        check_unit("target_score", self.target_score, &mut errors);
        check_unit("min_improvement", self.min_improvement, &mut errors);
        if self.max_iterations == 0 {
            errors.push(FieldError::new("max_iterations", "must be a positive integer"));
        }
        if self.early_stopping_rounds == 0 {
            errors.push(FieldError::new(
                "early_stopping_rounds",
                "must be a positive integer",
            ));
        }

        if self.dimension_weights.is_empty() {
            errors.push(FieldError::new("dimension_weights", "must not be empty"));
        } else {
            for (dim, weight) in &self.dimension_weights {
                check_unit(&format!("dimension_weights.{dim}"), *weight, &mut errors);
            }
            if let Err(message) = check_weight_sum(&self.dimension_weights) {
                errors.push(FieldError::new("dimension_weights", message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidConfig(errors))
        }
    }

    /// Applies per-run overrides on top of these defaults. The result is not validated.
    pub fn merged(&self, overrides: &OptimizationOverrides) -> OptimizationConfig {
        OptimizationConfig {
            target_score: overrides.target_score.unwrap_or(self.target_score),
            max_iterations: overrides.max_iterations.unwrap_or(self.max_iterations),
            early_stopping_rounds: overrides
                .early_stopping_rounds
                .unwrap_or(self.early_stopping_rounds),
            min_improvement: overrides.min_improvement.unwrap_or(self.min_improvement),
            dimension_weights: overrides
                .dimension_weights
                .clone()
                .unwrap_or_else(|| self.dimension_weights.clone()),
        }
    }
}

/// Checks Σ weights = 1.0 within `WEIGHT_TOLERANCE`. Shared by config load and the scorer.
pub fn check_weight_sum(weights: &DimensionWeights) -> Result<(), String> {
    let sum: f64 = weights.values().sum();
    if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(format!("weights must sum to 1.0 (got {sum:.6})"));
    }
    Ok(())
}

fn check_unit(field: &str, value: f64, errors: &mut Vec<FieldError>) {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        errors.push(FieldError::new(field, format!("must be within [0, 1] (got {value})")));
    }
}

/// Optional per-request overrides (HTTP body or queued job).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationOverrides {
    pub target_score: Option<f64>,
    pub max_iterations: Option<u32>,
    pub early_stopping_rounds: Option<u32>,
    pub min_improvement: Option<f64>,
    pub dimension_weights: Option<DimensionWeights>,
}

/// Parses `skills:0.4,experience:0.3,...` into a weight map.
pub fn parse_dimension_weights(raw: &str) -> Result<DimensionWeights, String> {
    let mut weights = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once(':')
            .ok_or_else(|| format!("expected 'dimension:weight', got '{pair}'"))?;
        let dim: Dimension = name.parse()?;
        let weight: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("invalid weight '{value}' for {dim}"))?;
        if weights.insert(dim, weight).is_some() {
            return Err(format!("dimension '{dim}' listed twice"));
        }
    }
    Ok(weights)
}

/// Engine tunables. The theme boost and priority threshold are exposed here rather than
/// hard-coded because sensible values depend on the posting corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Number of top themes extracted from each posting.
    pub theme_count: usize,
    /// Boost applied to the top theme; lower-ranked themes decay toward 1.0.
    pub theme_boost: f64,
    /// Gaps at or above this importance are always priority items.
    pub priority_threshold: f64,
    /// Strengths below this match strength get a rewording suggestion.
    pub rewording_threshold: f64,
    /// Matches below this strength are treated as unmatched.
    pub min_match_strength: f64,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub call_timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub cache_capacity: u64,
    /// Whether the recommendation summary is polished by the external capability.
    pub llm_summary: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            theme_count: 6,
            theme_boost: MAX_THEME_BOOST,
            priority_threshold: 0.6,
            rewording_threshold: 0.75,
            min_match_strength: 0.5,
            batch_size: 12,
            max_concurrent_batches: 4,
            call_timeout_secs: 60,
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            cache_capacity: 1024,
            llm_summary: true,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        check_unit("priority_threshold", self.priority_threshold, &mut errors);
        check_unit("rewording_threshold", self.rewording_threshold, &mut errors);
        check_unit("min_match_strength", self.min_match_strength, &mut errors);
        if !self.theme_boost.is_finite() || self.theme_boost < 1.0 {
            errors.push(FieldError::new("theme_boost", "must be at least 1.0"));
        }
        for (field, value) in [
            ("theme_count", self.theme_count),
            ("batch_size", self.batch_size),
            ("max_concurrent_batches", self.max_concurrent_batches),
        ] {
            if value == 0 {
                errors.push(FieldError::new(field, "must be a positive integer"));
            }
        }
        if self.call_timeout_secs == 0 {
            errors.push(FieldError::new("call_timeout_secs", "must be positive"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidConfig(errors))
        }
    }

    /// Theme boost clamped to [1.0, MAX_THEME_BOOST].
    pub fn bounded_theme_boost(&self) -> f64 {
        self.theme_boost.clamp(1.0, MAX_THEME_BOOST)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(err: AppError) -> Vec<String> {
        match err {
            AppError::InvalidConfig(fields) => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        OptimizationConfig::default().validate().unwrap();
        EngineSettings::default().validate().unwrap();
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let sum: f64 = default_dimension_weights().values().sum();
        assert!((sum - 1.0).abs() < WEIGHT_TOLERANCE);
    }

    #[test]
    fn test_weights_not_summing_to_one_rejected() {
        let mut config = OptimizationConfig::default();
        config.dimension_weights.insert(Dimension::Skills, 0.5);
        let fields = field_names(config.validate().unwrap_err());
        assert_eq!(fields, vec!["dimension_weights".to_string()]);
    }

    #[test]
    fn test_non_positive_iteration_bounds_rejected() {
        let config = OptimizationConfig {
            max_iterations: 0,
            early_stopping_rounds: 0,
            ..OptimizationConfig::default()
        };
        let fields = field_names(config.validate().unwrap_err());
        assert!(fields.contains(&"max_iterations".to_string()));
        assert!(fields.contains(&"early_stopping_rounds".to_string()));
    }

    #[test]
    fn test_all_violations_reported_together() {
        let config = OptimizationConfig {
            target_score: 1.2,
            max_iterations: 0,
            early_stopping_rounds: 1,
            min_improvement: -0.1,
            dimension_weights: BTreeMap::new(),
        };
        let fields = field_names(config.validate().unwrap_err());
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_nan_target_rejected() {
        let config = OptimizationConfig {
            target_score: f64::NAN,
            ..OptimizationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_dimension_weights_are_valid() {
        let config = OptimizationConfig {
            dimension_weights: BTreeMap::from([(Dimension::Skills, 1.0)]),
            ..OptimizationConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_merge_overrides_only_given_fields() {
        let base = OptimizationConfig::default();
        let merged = base.merged(&OptimizationOverrides {
            target_score: Some(0.9),
            ..OptimizationOverrides::default()
        });
        assert_eq!(merged.target_score, 0.9);
        assert_eq!(merged.max_iterations, base.max_iterations);
        assert_eq!(merged.dimension_weights, base.dimension_weights);
    }

    #[test]
    fn test_parse_dimension_weights() {
        let weights = parse_dimension_weights("skills:0.6, experience:0.4").unwrap();
        assert_eq!(weights.get(&Dimension::Skills), Some(&0.6));
        assert_eq!(weights.get(&Dimension::Experience), Some(&0.4));
        assert!(parse_dimension_weights("skills=0.6").is_err());
        assert!(parse_dimension_weights("vibes:1.0").is_err());
        assert!(parse_dimension_weights("skills:0.5,skills:0.5").is_err());
    }

    #[test]
    fn test_theme_boost_is_bounded() {
        let settings = EngineSettings {
            theme_boost: 3.0,
            ..EngineSettings::default()
        };
        assert_eq!(settings.bounded_theme_boost(), MAX_THEME_BOOST);
    }
}
