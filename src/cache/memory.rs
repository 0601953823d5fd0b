//! In-process LRU store of recent live results.

use super::lookup::{CacheLookup, CachedAnalysis, SimilarDocument};
use crate::clock::{self, Clock};
use crate::types::DocumentType;
use crate::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub expired: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    expired: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

struct Entry {
    value: CachedAnalysis,
    stored_at: Instant,
}

/// Bounded LRU with a fixed time-to-live per entry.
pub struct InMemoryAnalysisCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: AtomicStats,
}

impl InMemoryAnalysisCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, clock::system())
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
            stats: AtomicStats::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, value: CachedAnalysis) {
        let now = self.clock.now();
        self.lock().put(
            value.document_id.clone(),
            Entry {
                value,
                stored_at: now,
            },
        );
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    fn is_fresh(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) <= self.ttl
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| !self.is_fresh(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        self.stats
            .expired
            .fetch_add(stale.len() as u64, Ordering::Relaxed);
        stale.len()
    }
}

#[async_trait]
impl CacheLookup for InMemoryAnalysisCache {
    /// Most recently used first.
    async fn find_similar(
        &self,
        document_type: DocumentType,
        limit: usize,
    ) -> Result<Vec<SimilarDocument>> {
        let now = self.clock.now();
        let entries = self.lock();
        Ok(entries
            .iter()
            .filter(|(_, e)| e.value.document_type == document_type && self.is_fresh(e, now))
            .take(limit)
            .map(|(_, e)| SimilarDocument {
                document_id: e.value.document_id.clone(),
                document_type: e.value.document_type,
                overall_score: e.value.analysis.overall_score,
            })
            .collect())
    }

    async fn get(&self, document_id: &str) -> Result<Option<CachedAnalysis>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let lookup = entries
            .get(document_id)
            .map(|e| (self.is_fresh(e, now), e.value.clone()));
        let found = match lookup {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                entries.pop(document_id);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => None,
        };
        if found.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::DocumentAnalysis;

    fn cached(id: &str, doc: DocumentType, score: f64) -> CachedAnalysis {
        CachedAnalysis {
            document_id: id.to_string(),
            document_type: doc,
            analysis: DocumentAnalysis {
                document_id: id.to_string(),
                overall_score: score,
                ..Default::default()
            },
            suggestions: Vec::new(),
            provider: None,
        }
    }

    #[tokio::test]
    async fn test_find_similar_filters_type_and_limits() {
        let cache = InMemoryAnalysisCache::new(10, Duration::from_secs(60));
        cache.insert(cached("r1", DocumentType::Resume, 70.0));
        cache.insert(cached("m1", DocumentType::Marketing, 60.0));
        cache.insert(cached("r2", DocumentType::Resume, 80.0));

        let hits = cache.find_similar(DocumentType::Resume, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "r2");
        let all = cache.find_similar(DocumentType::Resume, 5).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let clock = ManualClock::new();
        let cache =
            InMemoryAnalysisCache::with_clock(10, Duration::from_secs(60), Arc::new(clock.clone()));
        cache.insert(cached("r1", DocumentType::Resume, 70.0));
        assert!(cache.get("r1").await.unwrap().is_some());

        clock.advance(Duration::from_secs(61));
        assert!(cache.find_similar(DocumentType::Resume, 5).await.unwrap().is_empty());
        assert!(cache.get("r1").await.unwrap().is_none());
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let cache = InMemoryAnalysisCache::new(2, Duration::from_secs(60));
        cache.insert(cached("a", DocumentType::Report, 50.0));
        cache.insert(cached("b", DocumentType::Report, 50.0));
        cache.get("a").await.unwrap();
        cache.insert(cached("c", DocumentType::Report, 50.0));
        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("a").await.unwrap().is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_purge_expired() {
        let clock = ManualClock::new();
        let cache =
            InMemoryAnalysisCache::with_clock(10, Duration::from_secs(5), Arc::new(clock.clone()));
        cache.insert(cached("a", DocumentType::Report, 50.0));
        clock.advance(Duration::from_secs(3));
        cache.insert(cached("b", DocumentType::Report, 50.0));
        clock.advance(Duration::from_secs(3));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
