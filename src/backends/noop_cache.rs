//! Noop Cache - stores nothing
//!
//! Every lookup misses, so every read goes to the data source. The per-request
//! memo still deduplicates within one request.

use anyhow::Result;
use async_trait::async_trait;

use crate::tags::CacheTag;
use crate::traits::{CacheBackend, CacheEntry};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }

    async fn insert(&self, _key: &str, _entry: CacheEntry) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn invalidate_tag(&self, _tag: &CacheTag) -> Result<()> {
        Ok(())
    }

    fn entry_count(&self) -> u64 {
        0
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Noop"
    }
}
