//! Read-through response cache keyed by content hash.
//!
//! Identical keys always map to identical values, so concurrent population from
//! parallel matcher batches needs no coordination beyond last-writer-wins.

use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// SHA-256 over the given parts, each length-prefixed so part boundaries matter.
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, String>,
}

impl ResponseCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    pub fn key(system: &str, prompt: &str) -> String {
        content_hash(&[system, prompt])
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let hit = self.inner.get(key).await;
        if hit.is_some() {
            tracing::trace!("response cache hit: {}", key);
        }
        hit
    }

    pub async fn insert(&self, key: String, value: String) {
        self.inner.insert(key, value).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(&["job", "Rust"]), content_hash(&["job", "Rust"]));
        assert_eq!(content_hash(&["a"]).len(), 64);
    }

    #[test]
    fn test_content_hash_respects_part_boundaries() {
        assert_ne!(content_hash(&["ab", "c"]), content_hash(&["a", "bc"]));
    }

    #[tokio::test]
    async fn test_cache_read_through() {
        let cache = ResponseCache::new(16);
        let key = ResponseCache::key("system", "prompt");
        assert!(cache.get(&key).await.is_none());
        cache.insert(key.clone(), "{}".to_string()).await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("{}"));
    }
}
