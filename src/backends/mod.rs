//! Cache Backend Implementations
//!
//! # Available Backends
//!
//! - **Moka** - Size-capped concurrent cache with TinyLFU eviction and a TTL
//!   safety net (default)
//! - **`DashMap`** - Simple concurrent `HashMap`, unbounded
//! - **Noop** - Stores nothing; every lookup is a miss
//!
//! # Usage
//!
//! ```rust
//! use parity_deals::backends::{MokaCache, MokaCacheConfig, NoopCache};
//!
//! # fn example() -> anyhow::Result<()> {
//! let moka = MokaCache::new(MokaCacheConfig::default())?;
//! let noop = NoopCache;
//! # Ok(())
//! # }
//! ```

pub mod dashmap_cache;
pub mod moka_cache;
pub mod noop_cache;

pub use dashmap_cache::DashMapCache;
pub use moka_cache::{MokaCache, MokaCacheConfig};
pub use noop_cache::NoopCache;

/// Default backend used when none is configured
pub type DefaultCache = MokaCache;
