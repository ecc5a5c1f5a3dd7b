//! L3: semantic similarity cache.
//!
//! An in-process vector table keyed by the raw query text. Lookup encodes
//! the query, scans for the best cosine match at or above the threshold,
//! and returns the stored entry. The tier is optional: without an
//! embedding backend every lookup misses.
//!
//! Entries carry the backend's model identifier and vector dimension;
//! entries written by a different model or dimension are skipped rather
//! than compared, and age out through insertion-order eviction.

use crate::cache::entry::CacheEntry;
use aide_types::prelude::{CacheCategory, ProviderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Deterministic text-to-vector encoder behind the semantic tier.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model_id(&self) -> &str;
    async fn encode(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct SemanticEntry {
    entry: CacheEntry,
    vector: Vec<f32>,
    model_id: String,
}

pub struct SemanticCache {
    backend: Box<dyn EmbeddingBackend>,
    threshold: f32,
    capacity: usize,
    entries: Mutex<VecDeque<SemanticEntry>>,
}

impl SemanticCache {
    pub fn new(backend: Box<dyn EmbeddingBackend>, threshold: f32, capacity: usize) -> Self {
        SemanticCache {
            backend,
            threshold,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Best entry whose cosine similarity clears the threshold, or `None`.
    /// Backend failures degrade to a miss for the current call.
    pub async fn find_similar(&self, query: &str, now: f64) -> Option<(CacheEntry, f32)> {
        let query_vector = match self.backend.encode(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Semantic encode failed; treating as miss");
                return None;
            }
        };

        let entries = self.entries.lock().expect("l3 lock poisoned");
        let mut best: Option<(CacheEntry, f32)> = None;
        for stored in entries.iter() {
            if stored.entry.is_expired(now) {
                continue;
            }
            if stored.model_id != self.backend.model_id()
                || stored.vector.len() != query_vector.len()
            {
                continue;
            }
            let similarity = cosine_similarity(&query_vector, &stored.vector);
            if similarity >= self.threshold
                && best.as_ref().map_or(true, |(_, s)| similarity > *s)
            {
                best = Some((stored.entry.clone(), similarity));
            }
        }
        if let Some((_, similarity)) = &best {
            debug!(similarity, "Semantic cache hit");
        }
        best
    }

    /// Store the raw query with its vector. Oldest insertions are evicted
    /// once capacity is reached. Backend failure drops the write silently.
    pub async fn add(&self, query: &str, entry: CacheEntry) -> bool {
        let vector = match self.backend.encode(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Semantic encode failed; dropping write");
                return false;
            }
        };
        let mut stored = entry;
        stored.key = query.to_string();
        stored.embedding = Some(vector.clone());

        let mut entries = self.entries.lock().expect("l3 lock poisoned");
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(SemanticEntry {
            entry: stored,
            vector,
            model_id: self.backend.model_id().to_string(),
        });
        true
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().expect("l3 lock poisoned");
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("l3 lock poisoned").len()
    }
}

/// Build a cache entry destined for the semantic tier.
pub fn semantic_entry(
    query: &str,
    value: String,
    category: CacheCategory,
    now: f64,
    metadata: Option<serde_json::Value>,
) -> CacheEntry {
    let mut entry = CacheEntry::new(query.to_string(), value, category, now, None);
    entry.metadata = metadata;
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_types::prelude::{CacheCategory, ProviderError};

    /// Maps known phrases onto fixed unit vectors so similarity is exact.
    struct FixtureEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FixtureEmbedder {
        fn model_id(&self) -> &str {
            "fixture-v1"
        }

        async fn encode(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(match text {
                "what is the weather?" => vec![1.0, 0.0, 0.0],
                "what is the weather today" => vec![0.99, 0.1, 0.0],
                "write me a poem" => vec![0.0, 1.0, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            })
        }
    }

    fn cache() -> SemanticCache {
        SemanticCache::new(Box::new(FixtureEmbedder), 0.92, 10)
    }

    #[tokio::test]
    async fn similar_query_hits_above_threshold() {
        let cache = cache();
        let entry = semantic_entry(
            "what is the weather?",
            "Sunny, 22C.".into(),
            CacheCategory::Weather,
            100.0,
            None,
        );
        assert!(cache.add("what is the weather?", entry).await);

        let (hit, similarity) = cache
            .find_similar("what is the weather today", 101.0)
            .await
            .expect("hit");
        assert_eq!(hit.value, "Sunny, 22C.");
        assert!(similarity >= 0.92);
    }

    #[tokio::test]
    async fn dissimilar_query_misses() {
        let cache = cache();
        let entry = semantic_entry(
            "what is the weather?",
            "Sunny, 22C.".into(),
            CacheCategory::Weather,
            100.0,
            None,
        );
        cache.add("what is the weather?", entry).await;
        assert!(cache.find_similar("write me a poem", 101.0).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_skipped() {
        let cache = cache();
        let mut entry = semantic_entry(
            "what is the weather?",
            "Sunny, 22C.".into(),
            CacheCategory::Weather,
            100.0,
            None,
        );
        entry.expires_at = 110.0;
        cache.add("what is the weather?", entry).await;
        assert!(cache
            .find_similar("what is the weather today", 111.0)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_insertion() {
        let cache = SemanticCache::new(Box::new(FixtureEmbedder), 0.92, 1);
        let first = semantic_entry(
            "what is the weather?",
            "Sunny.".into(),
            CacheCategory::Weather,
            100.0,
            None,
        );
        let second = semantic_entry(
            "write me a poem",
            "Roses are red.".into(),
            CacheCategory::General,
            100.0,
            None,
        );
        cache.add("what is the weather?", first).await;
        cache.add("write me a poem", second).await;
        assert_eq!(cache.len(), 1);
        assert!(cache
            .find_similar("what is the weather today", 101.0)
            .await
            .is_none());
        assert!(cache.find_similar("write me a poem", 101.0).await.is_some());
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
