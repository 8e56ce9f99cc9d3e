//! Verdict caching.
//!
//! Judge verdicts are deterministic for a given (contract, issue, judge
//! model, review text), so repeated evaluations of identical inputs can
//! reuse the verdict instead of paying for another call.

use moka::future::Cache;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::judge::JudgeVerdict;

/// Cache key for a judged issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerdictKey {
    pub contract: String,
    pub gt_id: String,
    pub model: String,
    pub review_hash: u64,
}

impl VerdictKey {
    pub fn new(contract: &str, gt_id: &str, model: &str, review_text: &str) -> Self {
        Self {
            contract: contract.to_string(),
            gt_id: gt_id.to_string(),
            model: model.to_string(),
            review_hash: hash_text(review_text),
        }
    }
}

fn hash_text(text: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// In-memory verdict cache.
pub struct VerdictCache {
    cache: Cache<VerdictKey, JudgeVerdict>,
}

impl VerdictCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &VerdictKey) -> Option<JudgeVerdict> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: VerdictKey, verdict: JudgeVerdict) {
        self.cache.insert(key, verdict).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for VerdictCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::Detection;

    #[tokio::test]
    async fn test_cache_round_trip() {
        let cache = VerdictCache::default();
        let key = VerdictKey::new("consulting", "GT-01", "judge-model", "review text");

        assert!(cache.get(&key).await.is_none());

        let verdict = JudgeVerdict {
            detection: Detection::Y,
            evidence_excerpt: "quote".to_string(),
            reasoning: "matches".to_string(),
        };
        cache.insert(key.clone(), verdict.clone()).await;

        assert_eq!(cache.get(&key).await, Some(verdict));
    }

    #[tokio::test]
    async fn test_different_review_text_misses() {
        let cache = VerdictCache::default();
        let key_a = VerdictKey::new("consulting", "GT-01", "judge-model", "review A");
        let key_b = VerdictKey::new("consulting", "GT-01", "judge-model", "review B");

        cache
            .insert(
                key_a,
                JudgeVerdict {
                    detection: Detection::N,
                    evidence_excerpt: String::new(),
                    reasoning: String::new(),
                },
            )
            .await;

        assert!(cache.get(&key_b).await.is_none());
    }
}
