//! Cached Query - request memo layered over the process-wide cache
//!
//! A [`CachedQuery`] pairs a typed fetch function with a tag list. Calling it
//! checks the per-request [`RequestContext`] memo first, then the
//! [`CacheManager`], and only then the fetch function. A read therefore runs
//! at most once per request and at most once per tag lifetime across
//! requests.
//!
//! # Example
//!
//! ```rust
//! use parity_deals::{CacheManager, CachedQuery, RequestContext};
//! use parity_deals::backends::DashMapCache;
//! use parity_deals::tags::{CacheTopic, user_tag};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = CacheManager::new(Arc::new(DashMapCache::new()));
//! let ctx = RequestContext::new();
//!
//! let count_products = CachedQuery::new(
//!     "product_count",
//!     vec![user_tag("user_1", CacheTopic::Products)],
//!     |user_id: String| async move { Ok::<_, anyhow::Error>(user_id.len() as u64) },
//! );
//!
//! let count = count_products.call(&cache, &ctx, "user_1".to_string()).await?;
//! assert_eq!(count, 6);
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;
use uuid::Uuid;

use crate::cache_manager::CacheManager;
use crate::tags::CacheTag;

/// Per-request scratch memo
///
/// Created at request entry and dropped at request exit. Values are shared
/// by every call site within the request; the memo is never invalidated, so
/// a request that mutates data and then re-reads it should call
/// [`RequestContext::clear`] in between.
pub struct RequestContext {
    id: Uuid,
    memo: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            memo: DashMap::new(),
        }
    }

    /// Identifier for log correlation
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let value = Arc::clone(self.memo.get(key)?.value());
        value.downcast_ref::<T>().cloned()
    }

    fn insert<T: Send + Sync + 'static>(&self, key: String, value: T) {
        self.memo.insert(key, Arc::new(value));
    }

    /// Forget every memoized value
    pub fn clear(&self) {
        self.memo.clear();
    }

    /// Number of memoized reads
    #[must_use]
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed read wrapped with its cache tags
pub struct CachedQuery<F> {
    name: &'static str,
    tags: Vec<CacheTag>,
    fetch: F,
}

impl<F> CachedQuery<F> {
    /// Wrap `fetch` under `name`; `name` must be unique per fetch function
    pub const fn new(name: &'static str, tags: Vec<CacheTag>, fetch: F) -> Self {
        Self { name, tags, fetch }
    }

    #[must_use]
    pub fn tags(&self) -> &[CacheTag] {
        &self.tags
    }

    /// Run the query through the request memo and the cache
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments cannot be encoded into a cache key
    /// or the fetch function fails.
    pub async fn call<A, T, Fut>(&self, cache: &CacheManager, ctx: &RequestContext, args: A) -> Result<T>
    where
        F: Fn(A) -> Fut,
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = self.key(&args)?;

        if let Some(value) = ctx.get::<T>(&key) {
            trace!(request = %ctx.id(), key = %key, "[MEMO HIT]");
            return Ok(value);
        }

        let fetch = (self.fetch)(args);
        let value = cache.get_or_compute(&key, &self.tags, move || fetch).await?;

        ctx.insert(key, value.clone());
        Ok(value)
    }

    /// `name(args)#tag,tag`, deterministic for equal arguments and tags
    fn key<A: Serialize>(&self, args: &A) -> Result<String> {
        let args = serde_json::to_string(args)
            .with_context(|| format!("Failed to encode arguments of query {}", self.name))?;
        let tags = self
            .tags
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{}({args})#{tags}", self.name))
    }
}
