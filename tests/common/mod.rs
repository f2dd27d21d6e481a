//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A seeded in-memory repository (country groups and countries)
//! - A counting repository decorator with optional read latency
//! - System setup and product fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parity_deals::models::{
    BannerProduct, CountryGroupWithDiscount, DeletedUser, DiscountCandidate, ProductView,
};
use parity_deals::{
    CountryDiscountInput, CountryGroup, CountryGroupDiscount, CustomizationUpdate,
    InMemoryRepository, ParityConfig, ParitySystem, ParitySystemBuilder, Product,
    ProductCustomization, ProductDetails, Repository, TierName, UserSubscription, async_trait,
};
use uuid::Uuid;

pub const OWNER: &str = "user_owner";
pub const SHOP_URL: &str = "https://shop.test/course";

/// Repository decorator counting calls per method
pub struct CountingRepository {
    inner: Arc<dyn Repository>,
    calls: DashMap<&'static str, u64>,
    read_delay: Option<Duration>,
    hide_customizations: bool,
}

impl CountingRepository {
    pub fn new(inner: Arc<dyn Repository>) -> Self {
        Self {
            inner,
            calls: DashMap::new(),
            read_delay: None,
            hide_customizations: false,
        }
    }

    /// Serve products by URL as if their customization row were missing
    pub fn without_customizations(mut self) -> Self {
        self.hide_customizations = true;
        self
    }

    /// Make every read take at least `delay`
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn calls(&self, method: &str) -> u64 {
        self.calls.get(method).map_or(0, |count| *count)
    }

    pub fn total_reads(&self) -> u64 {
        READS.iter().map(|method| self.calls(method)).sum()
    }

    async fn read(&self, method: &'static str) {
        *self.calls.entry(method).or_insert(0) += 1;
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn write(&self, method: &'static str) {
        *self.calls.entry(method).or_insert(0) += 1;
    }
}

const READS: [&str; 9] = [
    "products_for_user",
    "product",
    "product_count",
    "product_customization",
    "product_by_url",
    "discounts_for_country",
    "country_groups_for_product",
    "subscription",
    "product_view_count",
];

#[async_trait]
impl Repository for CountingRepository {
    async fn products_for_user(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<Product>> {
        self.read("products_for_user").await;
        self.inner.products_for_user(user_id, limit).await
    }

    async fn product(&self, id: Uuid, user_id: &str) -> Result<Option<Product>> {
        self.read("product").await;
        self.inner.product(id, user_id).await
    }

    async fn product_count(&self, user_id: &str) -> Result<u64> {
        self.read("product_count").await;
        self.inner.product_count(user_id).await
    }

    async fn product_customization(
        &self,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>> {
        self.read("product_customization").await;
        self.inner.product_customization(product_id, user_id).await
    }

    async fn product_by_url(&self, id: Uuid, url: &str) -> Result<Option<BannerProduct>> {
        self.read("product_by_url").await;
        let found = self.inner.product_by_url(id, url).await?;
        if self.hide_customizations {
            return Ok(found.map(|banner| BannerProduct {
                customization: None,
                ..banner
            }));
        }
        Ok(found)
    }

    async fn discounts_for_country(
        &self,
        product_id: Uuid,
        country_code: &str,
    ) -> Result<Vec<DiscountCandidate>> {
        self.read("discounts_for_country").await;
        self.inner.discounts_for_country(product_id, country_code).await
    }

    async fn country_groups_for_product(
        &self,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<CountryGroupWithDiscount>> {
        self.read("country_groups_for_product").await;
        self.inner.country_groups_for_product(product_id, user_id).await
    }

    async fn subscription(&self, user_id: &str) -> Result<Option<UserSubscription>> {
        self.read("subscription").await;
        self.inner.subscription(user_id).await
    }

    async fn product_view_count(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        self.read("product_view_count").await;
        self.inner.product_view_count(user_id, since).await
    }

    async fn create_product(&self, user_id: &str, details: &ProductDetails) -> Result<Product> {
        self.write("create_product");
        self.inner.create_product(user_id, details).await
    }

    async fn update_product(&self, id: Uuid, user_id: &str, details: &ProductDetails) -> Result<bool> {
        self.write("update_product");
        self.inner.update_product(id, user_id, details).await
    }

    async fn delete_product(&self, id: Uuid, user_id: &str) -> Result<bool> {
        self.write("delete_product");
        self.inner.delete_product(id, user_id).await
    }

    async fn replace_country_discounts(
        &self,
        product_id: Uuid,
        upserts: &[CountryGroupDiscount],
        removed_groups: &[Uuid],
    ) -> Result<u64> {
        self.write("replace_country_discounts");
        self.inner
            .replace_country_discounts(product_id, upserts, removed_groups)
            .await
    }

    async fn update_product_customization(
        &self,
        product_id: Uuid,
        user_id: &str,
        update: &CustomizationUpdate,
    ) -> Result<bool> {
        self.write("update_product_customization");
        self.inner
            .update_product_customization(product_id, user_id, update)
            .await
    }

    async fn insert_product_view(&self, product_id: Uuid, country_id: Option<Uuid>) -> Result<ProductView> {
        self.write("insert_product_view");
        self.inner.insert_product_view(product_id, country_id).await
    }

    async fn create_subscription(&self, user_id: &str, tier: TierName) -> Result<Option<UserSubscription>> {
        self.write("create_subscription");
        self.inner.create_subscription(user_id, tier).await
    }

    async fn update_subscription_tier(
        &self,
        user_id: &str,
        tier: TierName,
    ) -> Result<Option<UserSubscription>> {
        self.write("update_subscription_tier");
        self.inner.update_subscription_tier(user_id, tier).await
    }

    async fn delete_user(&self, user_id: &str) -> Result<DeletedUser> {
        self.write("delete_user");
        self.inner.delete_user(user_id).await
    }
}

/// Seeded country groups
pub struct Regions {
    /// US and CA
    pub north_america: CountryGroup,
    /// DE and FR
    pub europe: CountryGroup,
    /// JP, never discounted by the fixtures
    pub asia: CountryGroup,
}

/// Repository with three country groups and five countries
pub fn seeded_store() -> (Arc<InMemoryRepository>, Regions) {
    let store = Arc::new(InMemoryRepository::new());
    let group = |name: &str, recommended: f64| {
        store
            .seed_country_group(name, Some(recommended))
            .unwrap_or_else(|e| panic!("Failed to seed group {name}: {e}"))
    };
    let regions = Regions {
        north_america: group("North America", 0.1),
        europe: group("Europe", 0.15),
        asia: group("Asia", 0.3),
    };

    for (group, name, code) in [
        (&regions.north_america, "United States", "US"),
        (&regions.north_america, "Canada", "CA"),
        (&regions.europe, "Germany", "DE"),
        (&regions.europe, "France", "FR"),
        (&regions.asia, "Japan", "JP"),
    ] {
        store
            .seed_country(group.id, name, code)
            .unwrap_or_else(|e| panic!("Failed to seed country {code}: {e}"));
    }
    (store, regions)
}

/// Shared test environment
pub struct Fixture {
    pub system: ParitySystem,
    pub repo: Arc<CountingRepository>,
    pub store: Arc<InMemoryRepository>,
    pub regions: Regions,
}

pub fn test_config() -> ParityConfig {
    let mut config = ParityConfig::default();
    config.server_base_url = "https://parity.test".to_string();
    config.invalidation.retry_backoff = Duration::from_millis(1);
    config
}

/// System over a seeded store, Moka backend
pub fn setup() -> Fixture {
    setup_with(|repo| repo)
}

/// System over a seeded store whose counting decorator is customized
pub fn setup_with(customize: impl FnOnce(CountingRepository) -> CountingRepository) -> Fixture {
    parity_deals::telemetry::init_tracing();

    let (store, regions) = seeded_store();
    let repo = Arc::new(customize(CountingRepository::new(store.clone())));
    let system = ParitySystemBuilder::new()
        .with_config(test_config())
        .with_repository(repo.clone())
        .build()
        .unwrap_or_else(|e| panic!("Failed to build system: {e}"));

    Fixture {
        system,
        repo,
        store,
        regions,
    }
}

impl Fixture {
    /// Provision `user_id` on `tier`
    pub async fn user(&self, user_id: &str, tier: TierName) {
        let actions = self.system.actions();
        actions
            .provision_user(user_id)
            .await
            .unwrap_or_else(|e| panic!("Failed to provision {user_id}: {e}"));
        if tier != TierName::Free {
            actions
                .update_subscription_tier(user_id, tier)
                .await
                .unwrap_or_else(|e| panic!("Failed to set tier: {e}"));
        }
    }

    /// Create a product at `SHOP_URL` owned by `OWNER` (provisioned on
    /// `tier`) with "NA10" for North America and "EU15" for Europe
    pub async fn discounted_product(&self, tier: TierName) -> Product {
        self.user(OWNER, tier).await;
        let ctx = self.system.request_context();
        let outcome = self
            .system
            .actions()
            .create_product(&ctx, Some(OWNER), &details("Course", &format!("{SHOP_URL}/")))
            .await
            .unwrap_or_else(|e| panic!("Failed to create product: {e}"));
        assert!(!outcome.error, "{}", outcome.message);

        let product = self
            .system
            .queries()
            .get_products(&self.system.request_context(), OWNER, Some(1))
            .await
            .unwrap_or_else(|e| panic!("Failed to list products: {e}"))
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("Product missing"));

        let outcome = self
            .system
            .actions()
            .update_country_discounts(
                Some(OWNER),
                product.id,
                &[
                    discount_input(self.regions.north_america.id, "NA10", 10),
                    discount_input(self.regions.europe.id, "EU15", 15),
                ],
            )
            .await
            .unwrap_or_else(|e| panic!("Failed to save discounts: {e}"));
        assert!(!outcome.error);
        product
    }
}

pub fn details(name: &str, url: &str) -> ProductDetails {
    ProductDetails {
        name: name.to_string(),
        url: url.to_string(),
        description: Some("A course".to_string()),
    }
}

pub fn discount_input(country_group_id: Uuid, coupon: &str, percent: u32) -> CountryDiscountInput {
    CountryDiscountInput {
        country_group_id,
        coupon: Some(coupon.to_string()),
        discount_percentage: Some(percent),
    }
}
