//! `DashMap` Cache - Simple Concurrent `HashMap` Backend
//!
//! A lightweight in-memory cache using `DashMap` for concurrent access.
//! This is a reference implementation showing how to create custom cache backends.

use anyhow::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::tags::CacheTag;
use crate::traits::CacheEntry;

/// Simple concurrent cache using `DashMap`
///
/// **Features**:
/// - Concurrent reads/writes with per-shard locking
/// - Eager tag invalidation (matching entries are removed immediately)
///
/// **Limitations**:
/// - No eviction policy and no size limit (unbounded growth)
///
/// **When to use**:
/// - Tests and small deployments with a known, small key space
///
/// **Example**:
/// ```rust
/// use parity_deals::backends::DashMapCache;
/// use parity_deals::{CacheBackend, CacheEntry};
/// use parity_deals::tags::{CacheTopic, global_tag};
///
/// # async fn example() -> anyhow::Result<()> {
/// let cache = DashMapCache::new();
/// let tag = global_tag(CacheTopic::Products);
/// cache.insert("k", CacheEntry::new(bytes::Bytes::from_static(b"v"), &[tag.clone()], 0)).await?;
/// cache.invalidate_tag(&tag).await?;
/// assert!(cache.get("k").await.is_none());
/// # Ok(())
/// # }
/// ```
pub struct DashMapCache {
    map: Arc<DashMap<String, CacheEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
}

impl DashMapCache {
    /// Create new `DashMap` cache
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing DashMap Cache (concurrent HashMap)");

        Self {
            map: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get current cache size
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for DashMapCache {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Trait Implementations =====

use crate::traits::CacheBackend;
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for DashMapCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.map.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.value().clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.map.insert(key.to_string(), entry);
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "[DashMap] Cached key");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &CacheTag) -> Result<()> {
        let mut removed = 0usize;
        self.map.retain(|_, entry| {
            if entry.has_tag(tag) {
                removed += 1;
                false
            } else {
                true
            }
        });
        debug!(tag = %tag, count = removed, "[DashMap] Invalidated tag");
        Ok(())
    }

    fn entry_count(&self) -> u64 {
        self.map.len() as u64
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_dashmap";
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
        "DashMap"
    }
}
