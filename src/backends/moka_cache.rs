//! Moka Cache - In-Memory Cache Backend
//!
//! Size-capped in-memory cache using Moka. Tag invalidation is implemented
//! with Moka invalidation closures: entries matching the tag at the time of
//! the call are never returned again and are evicted lazily.

use anyhow::{Context, Result};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::tags::CacheTag;
use crate::traits::CacheEntry;

/// Configuration for `MokaCache`
#[derive(Debug, Clone, Copy)]
pub struct MokaCacheConfig {
    /// Max number of entries before eviction kicks in
    pub max_capacity: u64,
    /// Upper bound on an entry's lifetime regardless of invalidation
    pub time_to_live: Duration,
    /// Entries not read for this long are dropped
    pub time_to_idle: Duration,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Duration::from_secs(3600),
            time_to_idle: Duration::from_secs(600),
        }
    }
}

/// Moka in-memory cache with tag invalidation
///
/// This is the default backend, providing:
/// - Bounded memory (TinyLFU admission, LRU eviction)
/// - TTL/TTI as a safety net on top of tag invalidation
/// - Statistics tracking
pub struct MokaCache {
    cache: Cache<String, CacheEntry>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
}

impl MokaCache {
    /// Create new Moka cache
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable.
    pub fn new(config: MokaCacheConfig) -> Result<Self> {
        info!("Initializing Moka Cache");

        anyhow::ensure!(config.max_capacity > 0, "Moka max_capacity must be positive");

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .time_to_idle(config.time_to_idle)
            .support_invalidation_closures()
            .build();

        info!(
            capacity = config.max_capacity,
            ttl_secs = config.time_to_live.as_secs(),
            "Moka Cache initialized with tag invalidation support"
        );

        Ok(Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Snapshot of backend-level counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            size: self.cache.entry_count(),
        }
    }

    /// Apply pending evictions and invalidations now
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

// ===== Trait Implementations =====

use crate::traits::CacheBackend;
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for MokaCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.cache.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.cache.insert(key.to_string(), entry).await;
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "[Moka] Cached key");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &CacheTag) -> Result<()> {
        if tag.is_wildcard() {
            self.cache.invalidate_all();
        } else {
            let tag = tag.clone();
            self.cache
                .invalidate_entries_if(move |_key, entry| entry.has_tag(&tag))
                .context("Failed to register Moka invalidation predicate")?;
        }
        debug!(tag = %tag, "[Moka] Invalidated tag");
        Ok(())
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_moka";
        let entry = CacheEntry::new(bytes::Bytes::from_static(b"ok"), &[], 0);

        match self.insert(test_key, entry).await {
            Ok(()) => match self.get(test_key).await {
                Some(retrieved) => {
                    let _ = self.remove(test_key).await;
                    retrieved.value.as_ref() == b"ok"
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "Moka"
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub size: u64,
}
