use crate::error::CacheError;
use crate::graph::market_graph::MarketGraph;
use crate::logic::opportunity::Opportunity;
use crate::utils::fingerprint::Fingerprint;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// One cached payload with its creation time and volatility-derived TTL.
#[derive(Clone, Debug)]
pub struct CacheItem {
    pub payload: CachePayload,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheItem {
    pub fn new(payload: CachePayload, ttl: Duration) -> Self {
        Self { payload, created_at: Instant::now(), ttl }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Tagged cache payload. The tag check on read is what detects fingerprint
/// collisions between graph and opportunity entries.
#[derive(Clone, Debug)]
pub enum CachePayload {
    Graph(Arc<MarketGraph>),
    Opportunities(Vec<Opportunity>),
}

impl CachePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            CachePayload::Graph(_) => "graph",
            CachePayload::Opportunities(_) => "opportunities",
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: std::sync::atomic::AtomicU64,
    pub misses: std::sync::atomic::AtomicU64,
    pub evictions: std::sync::atomic::AtomicU64,
    pub corruptions: std::sync::atomic::AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(std::sync::atomic::Ordering::Relaxed);
        let misses = self.misses.load(std::sync::atomic::Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }
}

/// Fingerprint-keyed result cache with TTL-only eviction.
///
/// Expired entries are not swept by a background task; they read as misses
/// and are overwritten by the next put. The fingerprint space is small (it
/// is drawn from query parameters), so the working set stays bounded.
/// DashMap's sharded locks give the read-mostly access the engine needs:
/// readers never block readers, writers exclude only for the insert.
#[derive(Debug, Default)]
pub struct AdaptiveCache {
    entries: DashMap<Fingerprint, CacheItem>,
    pub stats: CacheStats,
}

impl AdaptiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph snapshot for a fingerprint, if present, fresh and of the right
    /// kind. A kind mismatch removes the entry and surfaces as
    /// `CacheError` so the caller can count it as a forced miss.
    pub fn get_graph(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<MarketGraph>>, CacheError> {
        match self.get_fresh(fingerprint) {
            Some(CachePayload::Graph(graph)) => {
                self.record_hit();
                Ok(Some(graph))
            }
            Some(other) => Err(self.corrupted(fingerprint, "graph", other.kind())),
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    pub fn get_opportunities(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<Opportunity>>, CacheError> {
        match self.get_fresh(fingerprint) {
            Some(CachePayload::Opportunities(opportunities)) => {
                self.record_hit();
                Ok(Some(opportunities))
            }
            Some(other) => Err(self.corrupted(fingerprint, "opportunities", other.kind())),
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    pub fn put_graph(&self, fingerprint: Fingerprint, graph: Arc<MarketGraph>, ttl: Duration) {
        self.entries.insert(fingerprint, CacheItem::new(CachePayload::Graph(graph), ttl));
    }

    pub fn put_opportunities(&self, fingerprint: Fingerprint, opportunities: Vec<Opportunity>, ttl: Duration) {
        self.entries.insert(fingerprint, CacheItem::new(CachePayload::Opportunities(opportunities), ttl));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn get_fresh(&self, fingerprint: &Fingerprint) -> Option<CachePayload> {
        if let Some(item) = self.entries.get(fingerprint) {
            if !item.is_expired() {
                return Some(item.payload.clone());
            }
        } else {
            return None;
        }

        // Expired: drop it now rather than waiting for the overwrite.
        self.entries.remove(fingerprint);
        self.stats.evictions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        None
    }

    fn corrupted(&self, fingerprint: &Fingerprint, expected: &'static str, found: &'static str) -> CacheError {
        warn!(%fingerprint, expected, found, "cache payload kind mismatch, treating as forced miss");
        self.entries.remove(fingerprint);
        self.stats.corruptions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.record_miss();
        CacheError::PayloadKindMismatch { fingerprint: *fingerprint, expected, found }
    }

    fn record_hit(&self) {
        self.stats.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.stats.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}
