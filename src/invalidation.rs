//! Invalidation Dispatcher
//!
//! Every mutation that changed persisted state calls
//! [`InvalidationDispatcher::revalidate`] once after commit. The dispatcher
//! expands the revalidation into its tags (global, plus user and entity when
//! present) and drops them from the cache.
//!
//! Delivery is at-least-once. The cache manager treats an invalidated tag as
//! expired before it asks the backend to drop entries, so a failing backend
//! can delay eviction but never serve stale data; the backend call itself is
//! retried with exponential backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache_manager::CacheManager;
use crate::tags::{CacheTag, CacheTopic, entity_tag, global_tag, user_tag};

/// What a mutation changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revalidation {
    pub topic: CacheTopic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Revalidation {
    /// Revalidate only the topic's global tag
    #[must_use]
    pub const fn topic(topic: CacheTopic) -> Self {
        Self {
            topic,
            user_id: None,
            entity_id: None,
        }
    }

    /// Also revalidate the acting user's tag
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Also revalidate the affected entity's tag
    #[must_use]
    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    /// Tags to drop, global first
    #[must_use]
    pub fn tags(&self) -> Vec<CacheTag> {
        let mut tags = vec![global_tag(self.topic)];
        if let Some(user_id) = &self.user_id {
            tags.push(user_tag(user_id.as_str(), self.topic));
        }
        if let Some(id) = &self.entity_id {
            tags.push(entity_tag(id, self.topic));
        }
        tags
    }
}

/// Configuration for cache invalidation
#[derive(Debug, Clone)]
pub struct InvalidationConfig {
    /// Backend attempts per tag, at least one
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for every further retry
    pub retry_backoff: Duration,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Statistics for invalidation operations
#[derive(Debug, Default, Clone)]
pub struct InvalidationStats {
    /// Number of `revalidate` calls
    pub revalidations: u64,

    /// Number of tags dropped
    pub tags_invalidated: u64,

    /// Number of backend retries
    pub retries: u64,

    /// Tags whose backend removal still failed after every attempt
    pub failures: u64,

    /// Number of full flushes
    pub flushes: u64,
}

/// Thread-safe statistics for invalidation operations
#[derive(Debug, Default)]
pub struct AtomicInvalidationStats {
    pub revalidations: AtomicU64,
    pub tags_invalidated: AtomicU64,
    pub retries: AtomicU64,
    pub failures: AtomicU64,
    pub flushes: AtomicU64,
}

impl AtomicInvalidationStats {
    pub fn snapshot(&self) -> InvalidationStats {
        InvalidationStats {
            revalidations: self.revalidations.load(Ordering::Relaxed),
            tags_invalidated: self.tags_invalidated.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

/// Fans mutations out to cache tag invalidations
#[derive(Clone)]
pub struct InvalidationDispatcher {
    cache: Arc<CacheManager>,
    config: InvalidationConfig,
    stats: Arc<AtomicInvalidationStats>,
}

impl InvalidationDispatcher {
    pub fn new(cache: Arc<CacheManager>, config: InvalidationConfig) -> Self {
        Self {
            cache,
            config,
            stats: Arc::new(AtomicInvalidationStats::default()),
        }
    }

    /// Drop every entry tagged by `revalidation`
    ///
    /// Never fails: the tags are expired as soon as this returns, even when
    /// the backend kept rejecting removal.
    pub async fn revalidate(&self, revalidation: Revalidation) {
        self.stats.revalidations.fetch_add(1, Ordering::Relaxed);
        debug!(
            topic = %revalidation.topic,
            user_id = ?revalidation.user_id,
            entity_id = ?revalidation.entity_id,
            "Revalidating"
        );

        for tag in revalidation.tags() {
            self.invalidate_with_retry(&tag).await;
        }
    }

    /// Drop every entry regardless of topic
    pub async fn flush_all(&self) {
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        info!("Flushing all cached entries");
        self.invalidate_with_retry(&CacheTag::Wildcard).await;
    }

    async fn invalidate_with_retry(&self, tag: &CacheTag) {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.retry_backoff;

        for attempt in 1..=attempts {
            match self.cache.invalidate_tag(tag).await {
                Ok(()) => {
                    self.stats.tags_invalidated.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < attempts => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(tag = %tag, attempt, error = %e, "Invalidation failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        tag = %tag,
                        attempts,
                        error = %e,
                        "Backend kept rejecting invalidation; entries stay expired until evicted"
                    );
                }
            }
        }
    }

    /// Get a snapshot of current statistics
    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }
}
