//! LlmGateway: structured calls to the external capability.
//!
//! Every engine stage goes through `call_json`, which applies, in order:
//! response cache → per-call timeout → retry policy → JSON extraction →
//! deserialization → schema validation. `call_json_uncached` skips only the cache.
//! Unvalidated output never leaves this module.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::llm_client::cache::ResponseCache;
use crate::llm_client::retry::RetryPolicy;
use crate::llm_client::{extract_json, LlmError, TextUnderstanding};

/// Schema check applied to every decoded response before it is trusted.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Clone)]
pub struct LlmGateway {
    backend: Arc<dyn TextUnderstanding>,
    cache: ResponseCache,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl LlmGateway {
    pub fn new(
        backend: Arc<dyn TextUnderstanding>,
        retry: RetryPolicy,
        call_timeout: Duration,
        cache_capacity: u64,
    ) -> Self {
        Self {
            backend,
            cache: ResponseCache::new(cache_capacity),
            retry,
            call_timeout,
        }
    }

    /// Calls the capability and decodes + validates the JSON payload of its reply.
    /// Only replies that pass validation are cached.
    pub async fn call_json<T>(&self, prompt: &str, system: &str) -> Result<T, LlmError>
    where
        T: DeserializeOwned + Validate,
    {
        let key = ResponseCache::key(system, prompt);
        if let Some(raw) = self.cache.get(&key).await {
            if let Ok(value) = decode::<T>(&raw) {
                return Ok(value);
            }
        }

        let raw = self.call_with_retry(prompt, system).await?;
        let value = decode::<T>(&raw)?;
        self.cache.insert(key, raw).await;
        Ok(value)
    }

    /// Same pipeline without the response cache. For calls where asking again must reach
    /// the capability again, such as retrying a revision whose output was rejected.
    pub async fn call_json_uncached<T>(&self, prompt: &str, system: &str) -> Result<T, LlmError>
    where
        T: DeserializeOwned + Validate,
    {
        let raw = self.call_with_retry(prompt, system).await?;
        decode::<T>(&raw)
    }

    async fn call_with_retry(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.call_timeout, self.backend.complete(prompt, system))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout(self.call_timeout)),
                };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "LLM call attempt {}/{} failed ({}), retrying after {}ms...",
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn decode<T>(raw: &str) -> Result<T, LlmError>
where
    T: DeserializeOwned + Validate,
{
    let json = extract_json(raw).ok_or(LlmError::EmptyContent)?;
    let value: T = serde_json::from_str(json)?;
    value.validate().map_err(LlmError::Schema)?;
    Ok(value)
}
