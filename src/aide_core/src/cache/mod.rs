//! Multi-level response cache.
//!
//! Four tiers consulted in order: L0 static templates, L1 in-memory
//! recency map, L2 persistent SQLite store (hits promote into L1), and
//! L3 semantic similarity. Writes go to L1/L2/L3; `system-action`
//! responses and error/interrupted terminals are never written.

pub mod entry;
pub mod fingerprint;
pub mod memory;
pub mod semantic;
pub mod store;
pub mod templates;

use crate::cache::entry::CacheEntry;
use crate::cache::fingerprint::Normalizer;
use crate::cache::memory::MemoryCache;
use crate::cache::semantic::{EmbeddingBackend, SemanticCache};
use crate::cache::store::PersistentCache;
use crate::cache::templates::ResponseTemplates;
use crate::core::config::CacheConfig;
use aide_types::prelude::{
    CacheCategory, CacheStats, CacheTier, CoreError, CoreResult, Fingerprint, Message, Response,
    Role, TaskType, TerminalReason,
};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub(crate) fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Default)]
struct Counters {
    l0_hits: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

pub struct IntelligentCache {
    enabled: bool,
    normalizer: Normalizer,
    templates: Option<RwLock<ResponseTemplates>>,
    memory: MemoryCache,
    persistent: Option<PersistentCache>,
    semantic: Option<SemanticCache>,
    counters: Counters,
}

impl IntelligentCache {
    /// Assemble the tiers from configuration. The semantic tier comes up
    /// only when enabled *and* a backend is supplied.
    pub async fn build(
        config: &CacheConfig,
        assistant_name: &str,
        embedding_backend: Option<Box<dyn EmbeddingBackend>>,
    ) -> CoreResult<Self> {
        let persistent = match &config.l2_path {
            Some(path) => Some(
                PersistentCache::open(path, config.l2_max_entries, config.l2_cleanup_interval_secs)
                    .await
                    .map_err(|e| {
                        CoreError::Config(format!("invalid cache path {}: {}", path.display(), e))
                    })?,
            ),
            None => None,
        };

        let semantic = match (config.semantic_enabled, embedding_backend) {
            (true, Some(backend)) => Some(SemanticCache::new(
                backend,
                config.semantic_threshold,
                config.semantic_capacity,
            )),
            _ => None,
        };

        Ok(IntelligentCache {
            enabled: config.enabled,
            normalizer: Normalizer::new(assistant_name),
            templates: config
                .templates_enabled
                .then(|| RwLock::new(ResponseTemplates::new())),
            memory: MemoryCache::new(config.l1_capacity),
            persistent,
            semantic,
            counters: Counters::default(),
        })
    }

    pub fn fingerprint(&self, messages: &[Message]) -> Fingerprint {
        self.normalizer.fingerprint(messages)
    }

    pub fn fingerprint_text(&self, text: &str) -> Fingerprint {
        self.normalizer.fingerprint_text(text)
    }

    /// Tiered lookup. Returns a materialised response with its cached
    /// flag and tier set, or `None` on a full miss.
    pub async fn get(
        &self,
        messages: &[Message],
        skip_semantic: bool,
        category_hint: Option<CacheCategory>,
    ) -> Option<Response> {
        if !self.enabled {
            return None;
        }
        let query = last_user_text(messages);
        let now = epoch_secs();

        if let (Some(templates), Some(query)) = (&self.templates, query) {
            let reply = templates.read().expect("template lock poisoned").get(query);
            if let Some(text) = reply {
                self.counters.l0_hits.fetch_add(1, Ordering::Relaxed);
                debug!(query = %truncate(query), "Template cache hit");
                return Some(template_response(text));
            }
        }

        let key = self.normalizer.fingerprint(messages);

        if let Some(entry) = self.memory.get(&key, now) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %&key[..12], "Memory cache hit");
            return Some(entry_response(&entry, CacheTier::Memory));
        }

        if let Some(persistent) = &self.persistent {
            match persistent.get(&key, now).await {
                Ok(Some(entry)) => {
                    // Promote so the next lookup stays in memory.
                    let evicted = self.memory.insert(entry.clone());
                    self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
                    self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %&key[..12], "Persistent cache hit");
                    return Some(entry_response(&entry, CacheTier::Persistent));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Persistent cache read failed; tier bypassed");
                }
            }
        }

        let semantic_allowed = !skip_semantic
            && category_hint != Some(CacheCategory::SystemAction);
        if let (Some(semantic), Some(query), true) = (&self.semantic, query, semantic_allowed) {
            if let Some((entry, _similarity)) = semantic.find_similar(query, now).await {
                self.counters.l3_hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry_response(&entry, CacheTier::Semantic));
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write-back after a live provider response. No-op for uncacheable
    /// categories and for error/interrupted terminals.
    pub async fn put(
        &self,
        messages: &[Message],
        response: &Response,
        category: CacheCategory,
        ttl_override_secs: Option<u64>,
    ) {
        if !self.enabled || !category.is_cacheable() || !response.is_cache_worthy() {
            return;
        }
        let now = epoch_secs();
        let key = self.normalizer.fingerprint(messages);

        let mut entry = CacheEntry::new(
            key,
            response.content.clone(),
            category,
            now,
            ttl_override_secs,
        );
        entry.metadata = Some(response_metadata(response));

        let evicted = self.memory.insert(entry.clone());
        self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);

        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.insert(&entry).await {
                warn!(error = %e, "Persistent cache write dropped");
            }
        }

        if let (Some(semantic), Some(query)) = (&self.semantic, last_user_text(messages)) {
            let mut semantic_entry = entry.clone();
            semantic_entry.embedding = None;
            semantic.add(query, semantic_entry).await;
        }
    }

    /// Delete one fingerprint from L1 and L2. Returns entries removed.
    pub async fn invalidate_fingerprint(&self, key: &str) -> u64 {
        let mut count = 0;
        if self.memory.remove(key) {
            count += 1;
        }
        if let Some(persistent) = &self.persistent {
            match persistent.remove(key).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Persistent cache delete failed"),
            }
        }
        count
    }

    /// Delete every L2 row in a category. L3 is keyed by raw text and is
    /// left to TTL.
    pub async fn invalidate_category(&self, category: CacheCategory) -> u64 {
        match &self.persistent {
            Some(persistent) => match persistent.clear_category(category).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(error = %e, "Persistent category invalidation failed");
                    0
                }
            },
            None => 0,
        }
    }

    /// Wholesale reset of every tier and the hit statistics.
    pub async fn clear_all(&self) -> u64 {
        let mut count = self.memory.clear() as u64;
        if let Some(persistent) = &self.persistent {
            match persistent.clear().await {
                Ok(removed) => count += removed,
                Err(e) => warn!(error = %e, "Persistent cache clear failed"),
            }
        }
        if let Some(semantic) = &self.semantic {
            count += semantic.clear() as u64;
        }
        for counter in [
            &self.counters.l0_hits,
            &self.counters.l1_hits,
            &self.counters.l2_hits,
            &self.counters.l3_hits,
            &self.counters.misses,
            &self.counters.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        count
    }

    /// Eager housekeeping sweep across L1 and L2. The L2 sweep also runs
    /// lazily on reads; this entry point exists for administrative use.
    pub async fn sweep(&self) -> u64 {
        let now = epoch_secs();
        let mut removed = self.memory.cleanup_expired(now) as u64;
        if let Some(persistent) = &self.persistent {
            match persistent.cleanup(now).await {
                Ok(count) => removed += count,
                Err(e) => warn!(error = %e, "Persistent cache sweep failed"),
            }
        }
        removed
    }

    pub fn register_template(&self, key: &str, response: &str) {
        if let Some(templates) = &self.templates {
            templates
                .write()
                .expect("template lock poisoned")
                .register(key, response);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l0_hits: self.counters.l0_hits.load(Ordering::Relaxed),
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            l3_hits: self.counters.l3_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            l1_size: self.memory.len(),
        }
    }
}

fn last_user_text(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

fn truncate(text: &str) -> &str {
    let mut end = text.len().min(50);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn template_response(text: String) -> Response {
    Response {
        content: text,
        provider: "template".to_string(),
        model: "static".to_string(),
        tokens_used: None,
        terminal_reason: TerminalReason::Complete,
        task_type: None,
        cached: true,
        cache_tier: Some(CacheTier::Template),
    }
}

fn response_metadata(response: &Response) -> serde_json::Value {
    serde_json::json!({
        "provider": response.provider,
        "model": response.model,
        "tokens_used": response.tokens_used,
        "task_type": response.task_type.map(|t| t.as_str()),
    })
}

fn entry_response(entry: &CacheEntry, tier: CacheTier) -> Response {
    let metadata = entry.metadata.as_ref();
    let field = |name: &str| -> Option<String> {
        metadata
            .and_then(|m| m.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    Response {
        content: entry.value.clone(),
        provider: field("provider").unwrap_or_else(|| "cache".to_string()),
        model: field("model").unwrap_or_else(|| "cache".to_string()),
        tokens_used: metadata
            .and_then(|m| m.get("tokens_used"))
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
        terminal_reason: TerminalReason::Complete,
        task_type: field("task_type").as_deref().and_then(parse_task_type),
        cached: true,
        cache_tier: Some(tier),
    }
}

fn parse_task_type(s: &str) -> Option<TaskType> {
    TaskType::ALL.into_iter().find(|t| t.as_str() == s)
}
