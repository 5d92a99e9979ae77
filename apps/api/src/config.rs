use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::engine::config::{parse_dimension_weights, EngineSettings, OptimizationConfig};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or any value is invalid.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Enables the Postgres document vault when set.
    pub database_url: Option<String>,
    /// Enables the job-queue worker when set.
    pub redis_url: Option<String>,
    pub job_queue_key: String,
    pub result_queue_key: String,
    /// Process-wide run defaults; requests may override individual fields.
    pub optimization: OptimizationConfig,
    pub engine: EngineSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut optimization = OptimizationConfig::default();
        if let Some(v) = parse_var(&get, "TARGET_SCORE")? {
            optimization.target_score = v;
        }
        if let Some(v) = parse_var(&get, "MAX_ITERATIONS")? {
            optimization.max_iterations = v;
        }
        if let Some(v) = parse_var(&get, "EARLY_STOPPING_ROUNDS")? {
            optimization.early_stopping_rounds = v;
        }
        if let Some(v) = parse_var(&get, "MIN_IMPROVEMENT")? {
            optimization.min_improvement = v;
        }
        if let Some(raw) = get("DIMENSION_WEIGHTS") {
            optimization.dimension_weights = parse_dimension_weights(&raw)
                .map_err(|e| anyhow!("DIMENSION_WEIGHTS is invalid: {e}"))?;
        }
        optimization
            .validate()
            .context("Optimization defaults are invalid")?;

        let mut engine = EngineSettings::default();
        if let Some(v) = parse_var(&get, "THEME_COUNT")? {
            engine.theme_count = v;
        }
        if let Some(v) = parse_var(&get, "THEME_BOOST")? {
            engine.theme_boost = v;
        }
        if let Some(v) = parse_var(&get, "PRIORITY_THRESHOLD")? {
            engine.priority_threshold = v;
        }
        if let Some(v) = parse_var(&get, "REWORDING_THRESHOLD")? {
            engine.rewording_threshold = v;
        }
        if let Some(v) = parse_var(&get, "MIN_MATCH_STRENGTH")? {
            engine.min_match_strength = v;
        }
        if let Some(v) = parse_var(&get, "MATCH_BATCH_SIZE")? {
            engine.batch_size = v;
        }
        if let Some(v) = parse_var(&get, "MAX_CONCURRENT_BATCHES")? {
            engine.max_concurrent_batches = v;
        }
        if let Some(v) = parse_var(&get, "LLM_TIMEOUT_SECS")? {
            engine.call_timeout_secs = v;
        }
        if let Some(v) = parse_var(&get, "LLM_MAX_ATTEMPTS")? {
            engine.max_attempts = v;
        }
        if let Some(v) = parse_var(&get, "LLM_SUMMARY")? {
            engine.llm_summary = v;
        }
        engine.validate().context("Engine settings are invalid")?;

        Ok(Config {
            anthropic_api_key: get("ANTHROPIC_API_KEY").with_context(|| {
                "Required environment variable 'ANTHROPIC_API_KEY' is not set".to_string()
            })?,
            port: parse_var(&get, "PORT")?.unwrap_or(8080),
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            job_queue_key: get("JOB_QUEUE_KEY").unwrap_or_else(|| "fitloop:jobs".to_string()),
            result_queue_key: get("RESULT_QUEUE_KEY")
                .unwrap_or_else(|| "fitloop:results".to_string()),
            optimization,
            engine,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("{key} has invalid value '{raw}': {e}"))
        })
        .transpose()
}
