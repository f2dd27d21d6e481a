//! Parity System Builder
//!
//! Wires configuration, a cache backend and a repository into a
//! [`ParitySystem`].
//!
//! # Example: Using Defaults
//!
//! ```rust
//! use parity_deals::ParitySystemBuilder;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Moka cache over an empty in-memory repository
//! let system = ParitySystemBuilder::new().build()?;
//! assert_eq!(system.cache_manager().backend_name(), "Moka");
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Custom Backend and Repository
//!
//! ```rust,ignore
//! use parity_deals::{ParitySystemBuilder, ParityConfig};
//! use parity_deals::backends::NoopCache;
//! use std::sync::Arc;
//!
//! let system = ParitySystemBuilder::new()
//!     .with_config(ParityConfig::from_env()?)
//!     .with_backend(Arc::new(NoopCache))
//!     .with_repository(Arc::new(MyPostgresRepository::connect(url).await?))
//!     .build()?;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::actions::Actions;
use crate::backends::MokaCache;
use crate::banner::BannerService;
use crate::cache_manager::CacheManager;
use crate::config::ParityConfig;
use crate::discount::DiscountResolver;
use crate::invalidation::InvalidationDispatcher;
use crate::permissions::SubscriptionGate;
use crate::queries::Queries;
use crate::repository::{InMemoryRepository, Repository};
use crate::traits::CacheBackend;
use crate::ParitySystem;

/// Builder for [`ParitySystem`]
///
/// # Default Behavior
///
/// - **Config**: [`ParityConfig::default`]
/// - **Cache backend**: Moka, sized by `config.cache`
/// - **Repository**: an empty [`InMemoryRepository`]
#[derive(Default)]
pub struct ParitySystemBuilder {
    config: Option<ParityConfig>,
    backend: Option<Arc<dyn CacheBackend>>,
    repository: Option<Arc<dyn Repository>>,
}

impl ParitySystemBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: ParityConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default Moka backend
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Build the system
    ///
    /// # Errors
    ///
    /// Returns an error if the default backend rejects the cache
    /// configuration.
    pub fn build(self) -> Result<ParitySystem> {
        let config = self.config.unwrap_or_default();

        let backend: Arc<dyn CacheBackend> = match self.backend {
            Some(backend) => {
                info!(backend = backend.name(), "Using custom cache backend");
                backend
            }
            None => Arc::new(MokaCache::new(config.cache).context("Failed to create Moka cache")?),
        };
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryRepository::new()));

        let cache_manager =
            Arc::new(CacheManager::new(backend).with_tag_mark_capacity(config.tag_mark_capacity));
        let invalidator = InvalidationDispatcher::new(Arc::clone(&cache_manager), config.invalidation.clone());
        let queries = Queries::new(Arc::clone(&repository), Arc::clone(&cache_manager));
        let resolver = DiscountResolver::new(queries.clone());
        let gate = SubscriptionGate::new(queries.clone());
        let actions = Actions::new(Arc::clone(&repository), gate.clone(), invalidator.clone());
        let banners = BannerService::new(
            resolver.clone(),
            gate.clone(),
            actions.clone(),
            config.server_base_url.clone(),
            config.test_country_code.clone(),
        );

        info!(
            backend = cache_manager.backend_name(),
            server_base_url = %config.server_base_url,
            "Parity system built"
        );

        Ok(ParitySystem {
            cache_manager,
            invalidator,
            queries,
            resolver,
            gate,
            actions,
            banners,
            repository,
            config,
        })
    }
}
