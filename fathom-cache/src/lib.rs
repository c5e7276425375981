//! Content-addressed TTL caches for embeddings and built contexts.
//!
//! Entries are immutable once set; a write replaces the whole entry and
//! restarts its TTL, last writer wins. Expiry is checked on read. Expired
//! entries are evicted during moka's housekeeping or by `sweep_expired`,
//! which is meant to be driven by an outside scheduler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fathom_types::RetrievedContext;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use tracing::debug;

pub const DEFAULT_EMBEDDING_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(5 * 60);

/// Normalization applied before hashing: trim, then collapse whitespace runs
/// to one space. Case is preserved.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key for `text`: hex SHA-256 of the normalized text.
pub fn content_key(text: &str) -> String {
    format!("{:x}", Sha256::digest(normalize(text).as_bytes()))
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
}

/// Each entry lives for the ttl it was stored with.
struct PerEntryTtl;

impl<V> Expiry<String, Entry<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry<V>, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry<V>,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Concurrent cache with per-entry TTL.
pub struct TtlCache<V> {
    inner: Cache<String, Entry<V>>,
    expired: Arc<AtomicUsize>,
}

impl<V: Clone + Send + Sync + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new() -> Self {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();
        let inner: Cache<String, Entry<V>> = Cache::builder()
            .expire_after(PerEntryTtl)
            .eviction_listener(move |_key, _value, cause| {
                if matches!(cause, RemovalCause::Expired) {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();
        Self { inner, expired }
    }

    /// Live value for `key`; an expired entry is a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value)
    }

    pub fn set(&self, key: String, value: V, ttl: Duration) {
        self.inner.insert(key, Entry { value, ttl });
    }

    /// Evict every expired entry; returns how many this sweep removed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.expired.load(Ordering::Relaxed);
        self.inner.run_pending_tasks();
        self.expired.load(Ordering::Relaxed).saturating_sub(before)
    }

    /// Live entries. Runs pending housekeeping first so the count is exact.
    pub fn len(&self) -> usize {
        self.inner.run_pending_tasks();
        usize::try_from(self.inner.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CacheNamespace {
    Embedding,
    Context,
}

/// The two independent cache namespaces used by the engine.
pub struct ResultCache {
    embeddings: TtlCache<Arc<[f32]>>,
    contexts: TtlCache<Arc<RetrievedContext>>,
    embedding_ttl: Duration,
    context_ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_TTL, DEFAULT_CONTEXT_TTL)
    }
}

impl ResultCache {
    pub fn new(embedding_ttl: Duration, context_ttl: Duration) -> Self {
        Self {
            embeddings: TtlCache::new(),
            contexts: TtlCache::new(),
            embedding_ttl,
            context_ttl,
        }
    }

    pub fn ttl(&self, namespace: CacheNamespace) -> Duration {
        match namespace {
            CacheNamespace::Embedding => self.embedding_ttl,
            CacheNamespace::Context => self.context_ttl,
        }
    }

    pub fn embeddings(&self) -> &TtlCache<Arc<[f32]>> {
        &self.embeddings
    }

    pub fn contexts(&self) -> &TtlCache<Arc<RetrievedContext>> {
        &self.contexts
    }

    pub fn get_embedding(&self, text: &str) -> Option<Arc<[f32]>> {
        self.embeddings.get(&content_key(text))
    }

    pub fn set_embedding(&self, text: &str, vector: Arc<[f32]>) {
        self.embeddings
            .set(content_key(text), vector, self.embedding_ttl);
    }

    pub fn get_context(&self, query: &str) -> Option<Arc<RetrievedContext>> {
        self.contexts.get(&content_key(query))
    }

    pub fn set_context(&self, query: &str, context: Arc<RetrievedContext>) {
        self.contexts.set(content_key(query), context, self.context_ttl);
    }

    /// Maintenance sweep over both namespaces.
    pub fn sweep_expired(&self) -> usize {
        let embeddings = self.embeddings.sweep_expired();
        let contexts = self.contexts.sweep_expired();
        debug!(embeddings, contexts, "swept expired cache entries");
        embeddings + contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_content_addressed() {
        assert_eq!(content_key("  top   accounts "), content_key("top accounts"));
        assert_ne!(content_key("Top accounts"), content_key("top accounts"));
        assert_eq!(content_key("x").len(), 64);
    }

    #[test]
    fn insert_and_get() {
        let cache = TtlCache::new();
        cache.set("k".to_string(), 7u32, Duration::from_secs(10));
        assert_eq!(cache.get("k"), Some(7));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let cache = TtlCache::new();
        cache.set("k".to_string(), 1u32, Duration::from_millis(50));
        assert_eq!(cache.get("k"), Some(1));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn rewrite_restarts_the_ttl() {
        let cache = TtlCache::new();
        cache.set("k".to_string(), 1u32, Duration::from_millis(50));
        cache.set("k".to_string(), 2u32, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn sweep_only_drops_expired_entries() {
        let cache = TtlCache::new();
        cache.set("short".to_string(), 1u32, Duration::from_millis(30));
        cache.set("long".to_string(), 2u32, Duration::from_secs(100));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TtlCache::new();
        cache.set("a".to_string(), 1u32, Duration::from_secs(10));
        cache.set("b".to_string(), 2u32, Duration::from_secs(10));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn namespaces_have_independent_ttls() {
        let cache = ResultCache::new(Duration::from_secs(3600), Duration::from_millis(50));
        cache.set_embedding("q", Arc::from(vec![1.0_f32, 0.0]));
        cache.set_context(
            "q",
            Arc::new(RetrievedContext {
                intent: fathom_types::Intent::Unknown,
                models: Vec::new(),
                columns: Vec::new(),
                relationships: Vec::new(),
                document: String::new(),
                estimated_tokens: 0,
                truncated: false,
                degraded: false,
            }),
        );
        std::thread::sleep(Duration::from_millis(150));
        assert!(cache.get_context("q").is_none());
        assert!(cache.get_embedding("q").is_some());
        assert_eq!(cache.ttl(CacheNamespace::Context), Duration::from_millis(50));
    }
}
