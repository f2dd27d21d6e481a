//! Cached reads
//!
//! Every read the system performs, wrapped in a [`CachedQuery`] with the
//! tags its mutations revalidate. Callers pass the [`RequestContext`] of the
//! request they serve.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::cache_manager::CacheManager;
use crate::cached_query::{CachedQuery, RequestContext};
use crate::error::ParityError;
use crate::models::{
    BannerProduct, CountryGroupWithDiscount, DiscountCandidate, Product,
    ProductCustomization, UserSubscription,
};
use crate::repository::Repository;
use crate::tags::{CacheTag, CacheTopic, entity_tag, global_tag, user_tag};
use crate::tiers::SubscriptionTier;

/// Tags of reads that join products to the country tables
fn product_country_tags(product_id: Uuid) -> Vec<CacheTag> {
    vec![
        entity_tag(product_id, CacheTopic::Products),
        global_tag(CacheTopic::Countries),
        global_tag(CacheTopic::CountryGroups),
    ]
}

/// Cached read access to the repository
#[derive(Clone)]
pub struct Queries {
    repository: Arc<dyn Repository>,
    cache: Arc<CacheManager>,
}

impl Queries {
    pub fn new(repository: Arc<dyn Repository>, cache: Arc<CacheManager>) -> Self {
        Self { repository, cache }
    }

    async fn run<A, T, Fut>(
        &self,
        ctx: &RequestContext,
        name: &'static str,
        tags: Vec<CacheTag>,
        args: A,
        fetch: impl Fn(Arc<dyn Repository>, A) -> Fut,
    ) -> Result<T>
    where
        A: Serialize + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let repository = Arc::clone(&self.repository);
        CachedQuery::new(name, tags, move |args| fetch(Arc::clone(&repository), args))
            .call(&self.cache, ctx, args)
            .await
    }

    /// Products of a user, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_products(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>> {
        self.run(
            ctx,
            "get_products",
            vec![user_tag(user_id, CacheTopic::Products)],
            (user_id.to_string(), limit),
            |repo, (user_id, limit): (String, Option<usize>)| async move {
                repo.products_for_user(&user_id, limit).await
            },
        )
        .await
    }

    /// Product owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_product(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<Product>> {
        self.run(
            ctx,
            "get_product",
            vec![entity_tag(id, CacheTopic::Products)],
            (id, user_id.to_string()),
            |repo, (id, user_id): (Uuid, String)| async move { repo.product(id, &user_id).await },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_product_count(&self, ctx: &RequestContext, user_id: &str) -> Result<u64> {
        self.run(
            ctx,
            "get_product_count",
            vec![user_tag(user_id, CacheTopic::Products)],
            user_id.to_string(),
            |repo, user_id: String| async move { repo.product_count(&user_id).await },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_product_customization(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>> {
        self.run(
            ctx,
            "get_product_customization",
            vec![entity_tag(product_id, CacheTopic::Products)],
            (product_id, user_id.to_string()),
            |repo, (product_id, user_id): (Uuid, String)| async move {
                repo.product_customization(product_id, &user_id).await
            },
        )
        .await
    }

    /// Product matching both id and normalized URL
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_product_by_url(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        url: &str,
    ) -> Result<Option<BannerProduct>> {
        self.run(
            ctx,
            "get_product_by_url",
            vec![entity_tag(id, CacheTopic::Products)],
            (id, url.to_string()),
            |repo, (id, url): (Uuid, String)| async move { repo.product_by_url(id, &url).await },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_discounts_for_country(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        country_code: &str,
    ) -> Result<Vec<DiscountCandidate>> {
        self.run(
            ctx,
            "get_discounts_for_country",
            product_country_tags(product_id),
            (product_id, country_code.to_string()),
            |repo, (product_id, code): (Uuid, String)| async move {
                repo.discounts_for_country(product_id, &code).await
            },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_product_country_groups(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<CountryGroupWithDiscount>> {
        self.run(
            ctx,
            "get_product_country_groups",
            product_country_tags(product_id),
            (product_id, user_id.to_string()),
            |repo, (product_id, user_id): (Uuid, String)| async move {
                repo.country_groups_for_product(product_id, &user_id).await
            },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_user_subscription(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<Option<UserSubscription>> {
        self.run(
            ctx,
            "get_user_subscription",
            vec![user_tag(user_id, CacheTopic::Subscription)],
            user_id.to_string(),
            |repo, user_id: String| async move { repo.subscription(&user_id).await },
        )
        .await
    }

    /// Tier limits of a user
    ///
    /// # Errors
    ///
    /// Returns [`ParityError::MissingSubscription`] if the user was never
    /// provisioned, or an error if the repository fails.
    pub async fn get_user_subscription_tier(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> Result<SubscriptionTier> {
        match self.get_user_subscription(ctx, user_id).await? {
            Some(subscription) => Ok(subscription.tier.limits()),
            None => Err(ParityError::MissingSubscription {
                user_id: user_id.to_string(),
            }
            .into()),
        }
    }

    /// Views of all of a user's products since `since`
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn get_product_view_count(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.run(
            ctx,
            "get_product_view_count",
            vec![user_tag(user_id, CacheTopic::ProductViews)],
            (user_id.to_string(), since),
            |repo, (user_id, since): (String, DateTime<Utc>)| async move {
                repo.product_view_count(&user_id, since).await
            },
        )
        .await
    }
}
