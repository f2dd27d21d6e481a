//! Repository - typed access to the persistent data source
//!
//! The data source is the single source of truth; everything the cache holds
//! is derived from these reads. Ownership-scoped reads and writes take the
//! acting user's id and behave as if the row does not exist when the user
//! does not own it.

mod memory;

pub use memory::InMemoryRepository;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    BannerProduct, CountryGroupDiscount, CountryGroupWithDiscount, CustomizationUpdate,
    DeletedUser, DiscountCandidate, Product, ProductCustomization, ProductDetails, ProductView,
    UserSubscription,
};
use crate::tiers::TierName;

#[async_trait]
pub trait Repository: Send + Sync {
    // ===== Reads =====

    /// Products of `user_id`, newest first
    async fn products_for_user(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<Product>>;

    async fn product(&self, id: Uuid, user_id: &str) -> Result<Option<Product>>;

    async fn product_count(&self, user_id: &str) -> Result<u64>;

    async fn product_customization(
        &self,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>>;

    /// Product whose id and stored URL both match, with its customization
    async fn product_by_url(&self, id: Uuid, url: &str) -> Result<Option<BannerProduct>>;

    /// Discount rows of a product in load order, each with the countries of
    /// its group whose code equals `country_code`
    async fn discounts_for_country(
        &self,
        product_id: Uuid,
        country_code: &str,
    ) -> Result<Vec<DiscountCandidate>>;

    /// Every country group with its countries and the product's discount
    async fn country_groups_for_product(
        &self,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<CountryGroupWithDiscount>>;

    async fn subscription(&self, user_id: &str) -> Result<Option<UserSubscription>>;

    /// Views of every product owned by `user_id` since `since`
    async fn product_view_count(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64>;

    // ===== Writes =====

    /// Insert a product together with its default customization
    async fn create_product(&self, user_id: &str, details: &ProductDetails) -> Result<Product>;

    /// Returns whether a row changed
    async fn update_product(&self, id: Uuid, user_id: &str, details: &ProductDetails) -> Result<bool>;

    /// Delete a product and everything hanging off it; returns whether a row
    /// was deleted
    async fn delete_product(&self, id: Uuid, user_id: &str) -> Result<bool>;

    /// Upsert `upserts` and delete the rows of `removed_groups`, atomically;
    /// returns the number of rows touched
    async fn replace_country_discounts(
        &self,
        product_id: Uuid,
        upserts: &[CountryGroupDiscount],
        removed_groups: &[Uuid],
    ) -> Result<u64>;

    /// Returns whether a row changed
    async fn update_product_customization(
        &self,
        product_id: Uuid,
        user_id: &str,
        update: &CustomizationUpdate,
    ) -> Result<bool>;

    async fn insert_product_view(
        &self,
        product_id: Uuid,
        country_id: Option<Uuid>,
    ) -> Result<ProductView>;

    /// Insert a subscription unless the user already has one
    async fn create_subscription(
        &self,
        user_id: &str,
        tier: TierName,
    ) -> Result<Option<UserSubscription>>;

    /// Returns the updated record, `None` when the user has no subscription
    async fn update_subscription_tier(
        &self,
        user_id: &str,
        tier: TierName,
    ) -> Result<Option<UserSubscription>>;

    /// Delete a user's subscription and products
    async fn delete_user(&self, user_id: &str) -> Result<DeletedUser>;
}
