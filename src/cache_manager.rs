//! Cache Manager - Tag-Addressed Cache Store
//!
//! Owns the process-wide cache: get-or-compute with stampede protection,
//! invalidation by tag, and full flush through the wildcard tag.
//!
//! # Invalidation epochs
//!
//! The manager keeps a monotonically increasing epoch. Invalidating a tag
//! bumps the epoch and records it against the tag. Every entry remembers the
//! epoch at which its computation *started*; an entry is served only while
//! none of its tags has been invalidated after that point. This makes
//! invalidation effective even when a backend's own removal fails, and it
//! keeps a computation that raced with an invalidation from publishing its
//! (possibly stale) result.
//!
//! Marks are bounded. Once more than the configured capacity are held, the
//! older half is folded into a single floor epoch: entries computed before
//! the floor are treated as invalidated. Folding only ever costs a
//! recomputation, never a stale read.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::codecs::JsonCodec;
use crate::tags::CacheTag;
use crate::traits::{CacheBackend, CacheCodec, CacheEntry, with_wildcard};

/// Invalidation marks kept before the oldest half is folded into the floor
pub const DEFAULT_TAG_MARK_CAPACITY: usize = 512;

/// Value of one shared computation, downcast by each waiter
type FlightValue = Arc<dyn Any + Send + Sync>;
/// Result of one shared computation; errors are shared between waiters
type FlightResult = std::result::Result<FlightValue, Arc<anyhow::Error>>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// An in-flight computation for one key
///
/// The registry only holds a weak handle: when every waiter has gone away
/// the computation is dropped and unregisters itself.
#[derive(Clone)]
struct InFlight {
    id: u64,
    tags: Arc<[CacheTag]>,
    future: WeakShared<BoxFuture<'static, FlightResult>>,
}

/// Removes its flight from the registry when the computation completes or
/// is dropped
struct FlightGuard {
    registry: Arc<DashMap<String, InFlight>>,
    key: String,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.registry.remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

/// Latest invalidation epoch per tag, bounded by folding old marks into a
/// floor
struct TagMarks {
    marks: DashMap<CacheTag, u64>,
    /// Entries computed before this epoch are stale
    floor: AtomicU64,
    capacity: usize,
    pruning: Mutex<()>,
}

impl TagMarks {
    fn new(capacity: usize) -> Self {
        Self {
            marks: DashMap::new(),
            floor: AtomicU64::new(0),
            capacity: capacity.max(2),
            pruning: Mutex::new(()),
        }
    }

    fn is_fresh(&self, tags: &[CacheTag], epoch: u64) -> bool {
        epoch >= self.floor.load(Ordering::SeqCst)
            && tags.iter().all(|tag| {
                self.marks
                    .get(tag)
                    .is_none_or(|invalidated_at| *invalidated_at <= epoch)
            })
    }

    fn mark(&self, tag: &CacheTag, epoch: u64) {
        if tag.is_wildcard() {
            // Every entry carries the wildcard, so it acts on all of them
            self.fold_through(epoch);
            return;
        }
        self.marks.insert(tag.clone(), epoch);
        if self.marks.len() > self.capacity {
            self.prune();
        }
    }

    /// Keep the newest half of the marks, fold the rest into the floor
    fn prune(&self) {
        let Some(_pruning) = self.pruning.try_lock() else {
            return;
        };
        let mut epochs: Vec<u64> = self.marks.iter().map(|mark| *mark.value()).collect();
        let keep = self.capacity / 2;
        let Some(cut) = epochs.len().checked_sub(keep + 1) else {
            return;
        };
        epochs.sort_unstable();
        if let Some(&threshold) = epochs.get(cut) {
            debug!(threshold, dropped = cut + 1, "Folding old invalidation marks into floor");
            self.fold_through(threshold);
        }
    }

    /// Raise the floor to `epoch`, then drop the marks it covers
    fn fold_through(&self, epoch: u64) {
        self.floor.fetch_max(epoch, Ordering::SeqCst);
        self.marks.retain(|_, invalidated_at| *invalidated_at > epoch);
    }

    fn len(&self) -> usize {
        self.marks.len()
    }
}

/// Cache Manager - get-or-compute and invalidate-by-tag over a backend
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    codec: JsonCodec,
    epoch: Arc<AtomicU64>,
    tag_marks: Arc<TagMarks>,
    /// In-flight computations, collapsing concurrent misses on the same key
    in_flight_requests: Arc<DashMap<String, InFlight>>,
    next_flight_id: AtomicU64,
    stats: Arc<AtomicCacheStats>,
}

impl CacheManager {
    /// Create new cache manager over `backend`
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        info!(backend = backend.name(), "Initializing Cache Manager");

        Self {
            backend,
            codec: JsonCodec,
            epoch: Arc::new(AtomicU64::new(0)),
            tag_marks: Arc::new(TagMarks::new(DEFAULT_TAG_MARK_CAPACITY)),
            in_flight_requests: Arc::new(DashMap::new()),
            next_flight_id: AtomicU64::new(0),
            stats: Arc::new(AtomicCacheStats::default()),
        }
    }

    /// Bound the number of per-tag invalidation marks
    #[must_use]
    pub fn with_tag_mark_capacity(mut self, capacity: usize) -> Self {
        self.tag_marks = Arc::new(TagMarks::new(capacity));
        self
    }

    /// Name of the underlying backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get a cached value or compute it, tagging the result with `tags` and
    /// the wildcard tag.
    ///
    /// Concurrent callers for the same key share one computation. If a caller
    /// stops waiting, the computation keeps running for the others; once no
    /// caller is left it is dropped.
    ///
    /// Cache failures never fail the read: an undecodable entry is treated as
    /// a miss, and a value that cannot be encoded or stored is returned
    /// without being cached.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let products: Vec<Product> = cache_manager
    ///     .get_or_compute("products:user_1", &[user_tag("user_1", CacheTopic::Products)], move || async move {
    ///         repository.products_for_user("user_1", None).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        tags: &[CacheTag],
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        // 1. Try the backend
        if let Some(entry) = self.backend.get(key).await {
            if self.tag_marks.is_fresh(&entry.tags, entry.epoch) {
                match self.codec.deserialize::<T>(&entry.value) {
                    Ok(value) => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key = %key, "[HIT] Served from cache");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cached value failed to decode. Will recompute.");
                    }
                }
            } else {
                self.stats.stale_rejections.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Rejected entry invalidated after it was computed");
                if let Err(e) = self.backend.remove(key).await {
                    warn!(key = %key, error = %e, "Failed to drop stale entry");
                }
            }
        }

        // 2. Miss - join or start the shared computation for this key
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let (flight, leader) = self.join_flight(key, tags, compute);
        if leader {
            debug!(key = %key, "Computing fresh value (stampede protected)");
        } else {
            self.stats.coalesced_requests.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Waiting on in-flight computation");
        }

        let value = flight.await.map_err(|e| anyhow::anyhow!("{e:#}"))?;
        value.downcast_ref::<T>().cloned().ok_or_else(|| {
            anyhow::anyhow!(
                "In-flight computation for {key} did not produce a {}",
                std::any::type_name::<T>()
            )
        })
    }

    fn join_flight<T, F, Fut>(&self, key: &str, tags: &[CacheTag], compute: F) -> (Flight, bool)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let entry = self.in_flight_requests.entry(key.to_string());
        if let Entry::Occupied(occupied) = &entry {
            if let Some(future) = occupied.get().future.upgrade() {
                return (future, false);
            }
        }

        let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let tags = with_wildcard(tags);
        let future = self.flight(key, Arc::clone(&tags), id, compute).shared();
        if let Some(weak) = future.downgrade() {
            entry.insert(InFlight {
                id,
                tags,
                future: weak,
            });
        }
        (future, true)
    }

    /// The shared computation: compute, store if encodable and still fresh.
    /// Unregisters itself when it finishes or is dropped.
    fn flight<T, F, Fut>(
        &self,
        key: &str,
        tags: Arc<[CacheTag]>,
        id: u64,
        compute: F,
    ) -> BoxFuture<'static, FlightResult>
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let tag_marks = Arc::clone(&self.tag_marks);
        let stats = Arc::clone(&self.stats);
        let codec = self.codec;
        let started_at = self.epoch.load(Ordering::SeqCst);
        let guard = FlightGuard {
            registry: Arc::clone(&self.in_flight_requests),
            key: key.to_string(),
            id,
        };

        async move {
            let key = guard.key.as_str();
            let value = match compute().await {
                Ok(value) => value,
                Err(e) => {
                    debug!(key = %key, error = %e, "Computation failed, nothing cached");
                    return Err(Arc::new(e));
                }
            };

            if tag_marks.is_fresh(&tags, started_at) {
                match codec.serialize(&value) {
                    Ok(bytes) => {
                        let entry = CacheEntry {
                            value: Bytes::from(bytes),
                            tags,
                            epoch: started_at,
                        };
                        match backend.insert(key, entry).await {
                            Ok(()) => debug!(key = %key, "Cached computed value"),
                            Err(e) => {
                                stats.store_failures.fetch_add(1, Ordering::Relaxed);
                                warn!(key = %key, error = %e, "Failed to cache computed value");
                            }
                        }
                    }
                    Err(e) => {
                        stats.store_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(key = %key, error = %e, "Computed value cannot be encoded, not caching");
                    }
                }
            } else {
                debug!(key = %key, "Invalidated while computing, not caching result");
            }

            drop(guard);
            Ok(Arc::new(value) as FlightValue)
        }
        .boxed()
    }

    /// Remove every entry tagged with `tag`
    ///
    /// Entries become unservable immediately, before the backend is asked to
    /// drop them, so a backend failure leaves no stale reads behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to drop the entries. The
    /// entries are still treated as expired.
    pub async fn invalidate_tag(&self, tag: &CacheTag) -> Result<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.tag_marks.mark(tag, epoch);

        // Later callers must not join a computation that started before this point
        self.in_flight_requests.retain(|_, flight| !flight.tags.contains(tag));

        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(tag = %tag, epoch, "Invalidating tag");

        self.backend.invalidate_tag(tag).await
    }

    /// Drop every cached entry regardless of topic
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to drop the entries.
    pub async fn flush_all(&self) -> Result<()> {
        info!("Flushing entire cache");
        self.invalidate_tag(&CacheTag::Wildcard).await
    }

    /// Check the backend
    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheManagerStats {
        self.stats.snapshot(
            self.in_flight_requests.len(),
            self.tag_marks.len(),
            self.backend.entry_count(),
        )
    }
}

/// Thread-safe counters behind [`CacheManagerStats`]
#[derive(Debug, Default)]
struct AtomicCacheStats {
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced_requests: AtomicU64,
    stale_rejections: AtomicU64,
    store_failures: AtomicU64,
    invalidations: AtomicU64,
}

impl AtomicCacheStats {
    #[allow(clippy::cast_precision_loss)]
    fn snapshot(&self, in_flight_requests: usize, tag_marks: usize, entries: u64) -> CacheManagerStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);

        CacheManagerStats {
            total_requests,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: if total_requests > 0 {
                (hits as f64 / total_requests as f64) * 100.0
            } else {
                0.0
            },
            in_flight_requests,
            tag_marks,
            entries,
        }
    }
}

/// Cache Manager statistics
#[derive(Debug, Clone)]
pub struct CacheManagerStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    /// Misses that waited on another caller's computation
    pub coalesced_requests: u64,
    /// Entries refused because a tag was invalidated after they were computed
    pub stale_rejections: u64,
    pub store_failures: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
    pub in_flight_requests: usize,
    /// Per-tag invalidation marks currently held
    pub tag_marks: usize,
    pub entries: u64,
}
