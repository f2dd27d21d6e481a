//! Cache Backend Traits
//!
//! This module defines the trait abstractions that allow the cache store to
//! run on different storage backends and serialization codecs.
//!
//! # Architecture
//!
//! - `CacheCodec`: Trait for pluggable serialization backends
//! - `CacheBackend`: Tag-aware storage used by the cache manager
//! - `CacheEntry`: What a backend stores per key
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use parity_deals::{CacheBackend, CacheEntry, CacheTag, async_trait};
//! use anyhow::Result;
//!
//! struct MyCustomCache {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl CacheBackend for MyCustomCache {
//!     async fn get(&self, key: &str) -> Option<CacheEntry> { /* ... */ }
//!     async fn insert(&self, key: &str, entry: CacheEntry) -> Result<()> { /* ... */ }
//!     async fn remove(&self, key: &str) -> Result<()> { /* ... */ }
//!     async fn invalidate_tag(&self, tag: &CacheTag) -> Result<()> { /* ... */ }
//!     fn entry_count(&self) -> u64 { /* ... */ }
//!     async fn health_check(&self) -> bool { /* ... */ }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

use crate::tags::CacheTag;

/// Trait for cache value serialization/deserialization
///
/// Implementations must be `Send + Sync + Debug` to support concurrent access
/// across async tasks.
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented by this codec.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Name of the codec, for logging
    fn name(&self) -> &'static str;
}

/// A stored cache value together with its tag set
///
/// `epoch` is the cache manager's invalidation epoch observed when the
/// computation that produced `value` started. The manager refuses to serve
/// an entry if any of its tags was invalidated after that epoch.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Bytes,
    /// Always contains [`CacheTag::Wildcard`]
    pub tags: Arc<[CacheTag]>,
    pub epoch: u64,
}

impl CacheEntry {
    /// Build an entry, attaching the wildcard tag if it is missing
    #[must_use]
    pub fn new(value: Bytes, tags: &[CacheTag], epoch: u64) -> Self {
        Self {
            value,
            tags: with_wildcard(tags),
            epoch,
        }
    }

    #[must_use]
    pub fn has_tag(&self, tag: &CacheTag) -> bool {
        self.tags.contains(tag)
    }
}

/// Copy `tags`, deduplicated, with the wildcard tag appended
pub(crate) fn with_wildcard(tags: &[CacheTag]) -> Arc<[CacheTag]> {
    let mut all: Vec<CacheTag> = Vec::with_capacity(tags.len() + 1);
    for tag in tags {
        if !all.contains(tag) {
            all.push(tag.clone());
        }
    }
    if !all.contains(&CacheTag::Wildcard) {
        all.push(CacheTag::Wildcard);
    }
    all.into()
}

/// Tag-aware cache storage
///
/// Backends hold entries by key and must be able to drop every entry that
/// carries a given tag. Backends are best-effort: a failed read is a miss and
/// a failed write only costs a recomputation later.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the manager calls them from many
/// request tasks at once.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get an entry by key, `None` when absent or expired
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Insert or replace the entry for `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not store the entry.
    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Remove the entry for `key` (no-op when absent)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not remove the entry.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry whose tag set contains `tag`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not schedule the removal.
    async fn invalidate_tag(&self, tag: &CacheTag) -> Result<()>;

    /// Approximate number of stored entries
    fn entry_count(&self) -> u64;

    /// Check if the backend is operational
    async fn health_check(&self) -> bool;

    /// Name of this backend, for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}
