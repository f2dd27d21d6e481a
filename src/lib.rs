//! Parity Deals
//!
//! Purchasing-power-parity discounts served from a tag-addressed cache:
//! - **Tag Registry**: deterministic global, user and entity tags per topic
//! - **Cache Store**: get-or-compute with single-flight stampede protection
//!   and invalidation by tag (Moka by default)
//! - **Cached Query**: a per-request memo layered over the shared cache
//! - **Invalidation Dispatcher**: at-least-once fan-out from mutations to tags
//! - **Discount Resolution Engine**: at most one discount per visitor country
//! - **Subscription Tier Gate**: quota and feature checks per tier
//!
//! # Quick Start
//!
//! ```rust
//! use parity_deals::{ParitySystemBuilder, ProductDetails};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let system = ParitySystemBuilder::new().build()?;
//! system.actions().provision_user("user_1").await?;
//!
//! let ctx = system.request_context();
//! let details = ProductDetails {
//!     name: "Course".to_string(),
//!     url: "https://course.test/".to_string(),
//!     description: None,
//! };
//! let outcome = system.actions().create_product(&ctx, Some("user_1"), &details).await?;
//! assert!(!outcome.error);
//!
//! // A fresh request sees the new product
//! let products = system.queries().get_products(&system.request_context(), "user_1", None).await?;
//! assert_eq!(products.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! read:   Cached Query → request memo → Cache Store (by key) → Repository
//!                                            ↑ drop by tag
//! write:  Action → Repository (commit) → Invalidation Dispatcher
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

pub mod actions;
pub mod backends;
pub mod banner;
pub mod builder;
pub mod cache_manager;
pub mod cached_query;
pub mod codecs;
pub mod config;
pub mod discount;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod permissions;
pub mod queries;
pub mod repository;
pub mod tags;
pub mod telemetry;
pub mod tiers;
pub mod traits;

pub use actions::{ActionOutcome, Actions, CountryDiscountInput};
pub use backends::{DashMapCache, MokaCache, MokaCacheConfig, NoopCache};
pub use banner::{Banner, BannerRequest, BannerService, embed_snippet};
pub use builder::ParitySystemBuilder;
pub use cache_manager::{CacheManager, CacheManagerStats};
pub use cached_query::{CachedQuery, RequestContext};
pub use codecs::JsonCodec;
pub use config::{ConfigError, ParityConfig};
pub use discount::{BannerResolution, Discount, DiscountResolver, ResolvedProduct};
pub use error::ParityError;
pub use invalidation::{InvalidationConfig, InvalidationDispatcher, InvalidationStats, Revalidation};
pub use models::{
    Country, CountryGroup, CountryGroupDiscount, CustomizationUpdate, Product,
    ProductCustomization, ProductDetails, UserSubscription,
};
pub use permissions::SubscriptionGate;
pub use queries::Queries;
pub use repository::{InMemoryRepository, Repository};
pub use tags::{CacheTag, CacheTopic};
pub use tiers::{SubscriptionTier, TierName};
pub use traits::{CacheBackend, CacheCodec, CacheEntry};

// Re-export async_trait for implementors of `CacheBackend` and `Repository`
pub use async_trait::async_trait;

/// Service context owning the process-wide cache
///
/// Created once at startup and shared by every request handler. Cloning is
/// cheap and every clone shares the same cache.
///
/// # Example
///
/// ```rust
/// use parity_deals::{BannerRequest, ParitySystemBuilder};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let system = ParitySystemBuilder::new().build()?;
/// let request = BannerRequest {
///     product_id: "not-a-product".to_string(),
///     country_code: Some("IN".to_string()),
///     referer: Some("https://course.test".to_string()),
/// };
/// let banner = system.banners().banner(&system.request_context(), &request).await?;
/// assert!(banner.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ParitySystem {
    /// Tag-addressed cache store
    pub cache_manager: Arc<CacheManager>,
    pub invalidator: InvalidationDispatcher,
    pub queries: Queries,
    pub resolver: DiscountResolver,
    pub gate: SubscriptionGate,
    pub actions: Actions,
    pub banners: BannerService,
    pub repository: Arc<dyn Repository>,
    pub config: ParityConfig,
}

impl ParitySystem {
    /// Moka cache over an empty in-memory repository, configured from the
    /// environment
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds an invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        ParitySystemBuilder::new()
            .with_config(ParityConfig::from_env()?)
            .build()
    }

    /// Memo for one incoming request
    #[must_use]
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new()
    }

    #[must_use]
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.cache_manager
    }

    #[must_use]
    pub const fn queries(&self) -> &Queries {
        &self.queries
    }

    #[must_use]
    pub const fn actions(&self) -> &Actions {
        &self.actions
    }

    #[must_use]
    pub const fn banners(&self) -> &BannerService {
        &self.banners
    }

    /// `<script>` tag embedding the banner of `product_id`
    #[must_use]
    pub fn embed_snippet(&self, product_id: Uuid) -> String {
        embed_snippet(&self.config.server_base_url, product_id)
    }

    /// Check the cache backend
    ///
    /// The cache is disposable, so a failing backend degrades performance
    /// only; it is still reported as unhealthy.
    pub async fn health_check(&self) -> bool {
        let healthy = self.cache_manager.health_check().await;
        if healthy {
            info!(backend = self.cache_manager.backend_name(), "Health check passed");
        } else {
            warn!(backend = self.cache_manager.backend_name(), "Cache backend health check failed");
        }
        healthy
    }
}
