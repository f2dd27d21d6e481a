//! In-memory repository
//!
//! Tables are insertion-ordered vectors behind one `parking_lot` lock, so
//! every write is atomic with respect to every read. Foreign keys cascade
//! the way the relational schema does and uniqueness constraints surface as
//! [`ParityError::Repository`].

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::Repository;
use crate::error::ParityError;
use crate::models::{
    BannerProduct, Country, CountryGroup, CountryGroupDiscount, CountryGroupWithDiscount,
    CustomizationUpdate, DeletedUser, DiscountCandidate, Product, ProductCustomization,
    ProductDetails, ProductView, UserSubscription,
};
use crate::tiers::TierName;

#[derive(Debug, Default)]
struct Tables {
    products: Vec<Product>,
    customizations: Vec<ProductCustomization>,
    country_groups: Vec<CountryGroup>,
    countries: Vec<Country>,
    discounts: Vec<CountryGroupDiscount>,
    subscriptions: Vec<UserSubscription>,
    views: Vec<ProductView>,
}

impl Tables {
    fn owned_product(&self, id: Uuid, user_id: &str) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| p.id == id && p.user_id == user_id)
    }

    fn customization_of(&self, product_id: Uuid) -> Option<&ProductCustomization> {
        self.customizations
            .iter()
            .find(|c| c.product_id == product_id)
    }

    fn countries_of(&self, group_id: Uuid) -> impl Iterator<Item = &Country> {
        self.countries
            .iter()
            .filter(move |c| c.country_group_id == group_id)
    }

    fn remove_product(&mut self, id: Uuid) {
        self.products.retain(|p| p.id != id);
        self.customizations.retain(|c| c.product_id != id);
        self.discounts.retain(|d| d.product_id != id);
        self.views.retain(|v| v.product_id != id);
    }
}

/// Repository backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    /// Number of read queries served, for tests
    reads: AtomicU64,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read queries served so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn read(&self) -> parking_lot::RwLockReadGuard<'_, Tables> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.tables.read()
    }

    /// Insert a country group
    ///
    /// # Errors
    ///
    /// Returns [`ParityError::Repository`] if the name is taken.
    pub fn seed_country_group(
        &self,
        name: &str,
        recommended_discount_percentage: Option<f64>,
    ) -> Result<CountryGroup> {
        let mut tables = self.tables.write();
        if tables.country_groups.iter().any(|g| g.name == name) {
            return Err(ParityError::Repository(format!("country group {name} already exists")).into());
        }
        let group = CountryGroup {
            id: Uuid::new_v4(),
            name: name.to_string(),
            recommended_discount_percentage,
        };
        tables.country_groups.push(group.clone());
        Ok(group)
    }

    /// Insert a country into an existing group
    ///
    /// # Errors
    ///
    /// Returns [`ParityError::Repository`] if the group is unknown or the
    /// name or code is taken.
    pub fn seed_country(&self, country_group_id: Uuid, name: &str, code: &str) -> Result<Country> {
        let mut tables = self.tables.write();
        if !tables.country_groups.iter().any(|g| g.id == country_group_id) {
            return Err(ParityError::Repository(format!("unknown country group {country_group_id}")).into());
        }
        if tables.countries.iter().any(|c| c.name == name || c.code == code) {
            return Err(ParityError::Repository(format!("country {name} ({code}) already exists")).into());
        }
        let country = Country {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: code.to_string(),
            country_group_id,
        };
        tables.countries.push(country.clone());
        Ok(country)
    }

    /// Total stored product views
    pub fn view_total(&self) -> usize {
        self.tables.read().views.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn products_for_user(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<Product>> {
        let tables = self.read();
        // Newest first; later inserts win ties
        let mut products: Vec<Product> = tables
            .products
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn product(&self, id: Uuid, user_id: &str) -> Result<Option<Product>> {
        Ok(self.read().owned_product(id, user_id).cloned())
    }

    async fn product_count(&self, user_id: &str) -> Result<u64> {
        let tables = self.read();
        Ok(tables.products.iter().filter(|p| p.user_id == user_id).count() as u64)
    }

    async fn product_customization(
        &self,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>> {
        let tables = self.read();
        if tables.owned_product(product_id, user_id).is_none() {
            return Ok(None);
        }
        Ok(tables.customization_of(product_id).cloned())
    }

    async fn product_by_url(&self, id: Uuid, url: &str) -> Result<Option<BannerProduct>> {
        let tables = self.read();
        let product = tables.products.iter().find(|p| p.id == id && p.url == url);
        Ok(product.map(|product| BannerProduct {
            product: product.clone(),
            customization: tables.customization_of(product.id).cloned(),
        }))
    }

    async fn discounts_for_country(
        &self,
        product_id: Uuid,
        country_code: &str,
    ) -> Result<Vec<DiscountCandidate>> {
        let tables = self.read();
        Ok(tables
            .discounts
            .iter()
            .filter(|d| d.product_id == product_id)
            .map(|d| DiscountCandidate {
                country_group_id: d.country_group_id,
                coupon: d.coupon.clone(),
                discount_percentage: d.discount_percentage,
                countries: tables
                    .countries_of(d.country_group_id)
                    .filter(|c| c.code == country_code)
                    .cloned()
                    .collect(),
            })
            .collect())
    }

    async fn country_groups_for_product(
        &self,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<Vec<CountryGroupWithDiscount>> {
        let tables = self.read();
        if tables.owned_product(product_id, user_id).is_none() {
            return Ok(Vec::new());
        }
        Ok(tables
            .country_groups
            .iter()
            .map(|group| CountryGroupWithDiscount {
                group: group.clone(),
                countries: tables.countries_of(group.id).cloned().collect(),
                discount: tables
                    .discounts
                    .iter()
                    .find(|d| d.product_id == product_id && d.country_group_id == group.id)
                    .cloned(),
            })
            .collect())
    }

    async fn subscription(&self, user_id: &str) -> Result<Option<UserSubscription>> {
        Ok(self
            .read()
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn product_view_count(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let tables = self.read();
        let count = tables
            .views
            .iter()
            .filter(|v| v.visited_at >= since)
            .filter(|v| {
                tables
                    .products
                    .iter()
                    .any(|p| p.id == v.product_id && p.user_id == user_id)
            })
            .count();
        Ok(count as u64)
    }

    async fn create_product(&self, user_id: &str, details: &ProductDetails) -> Result<Product> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: details.name.clone(),
            url: details.url.clone(),
            description: details.description.clone(),
            created_at: now,
            updated_at: now,
        };
        let customization = ProductCustomization::default_for(product.id);

        let mut tables = self.tables.write();
        tables.products.push(product.clone());
        tables.customizations.push(customization);
        debug!(product_id = %product.id, user_id = %user_id, "Inserted product");
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, user_id: &str, details: &ProductDetails) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(product) = tables
            .products
            .iter_mut()
            .find(|p| p.id == id && p.user_id == user_id)
        else {
            return Ok(false);
        };
        product.name.clone_from(&details.name);
        product.url.clone_from(&details.url);
        product.description.clone_from(&details.description);
        product.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_product(&self, id: Uuid, user_id: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.owned_product(id, user_id).is_none() {
            return Ok(false);
        }
        tables.remove_product(id);
        Ok(true)
    }

    async fn replace_country_discounts(
        &self,
        product_id: Uuid,
        upserts: &[CountryGroupDiscount],
        removed_groups: &[Uuid],
    ) -> Result<u64> {
        let mut tables = self.tables.write();
        if !tables.products.iter().any(|p| p.id == product_id) {
            return Err(ParityError::Repository(format!("unknown product {product_id}")).into());
        }
        if let Some(unknown) = upserts.iter().find(|d| {
            d.product_id != product_id
                || !tables.country_groups.iter().any(|g| g.id == d.country_group_id)
        }) {
            return Err(ParityError::Repository(format!(
                "discount for group {} does not reference product {product_id} and a known group",
                unknown.country_group_id
            ))
            .into());
        }

        let before = tables.discounts.len();
        tables
            .discounts
            .retain(|d| d.product_id != product_id || !removed_groups.contains(&d.country_group_id));
        let mut touched = (before - tables.discounts.len()) as u64;

        for discount in upserts {
            match tables.discounts.iter_mut().find(|d| {
                d.product_id == product_id && d.country_group_id == discount.country_group_id
            }) {
                Some(existing) => *existing = discount.clone(),
                None => tables.discounts.push(discount.clone()),
            }
            touched += 1;
        }
        Ok(touched)
    }

    async fn update_product_customization(
        &self,
        product_id: Uuid,
        user_id: &str,
        update: &CustomizationUpdate,
    ) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.owned_product(product_id, user_id).is_none() {
            return Ok(false);
        }
        Ok(tables
            .customizations
            .iter_mut()
            .find(|c| c.product_id == product_id)
            .is_some_and(|c| c.apply(update)))
    }

    async fn insert_product_view(
        &self,
        product_id: Uuid,
        country_id: Option<Uuid>,
    ) -> Result<ProductView> {
        let mut tables = self.tables.write();
        if !tables.products.iter().any(|p| p.id == product_id) {
            return Err(ParityError::Repository(format!("unknown product {product_id}")).into());
        }
        let view = ProductView {
            id: Uuid::new_v4(),
            product_id,
            country_id,
            visited_at: Utc::now(),
        };
        tables.views.push(view.clone());
        Ok(view)
    }

    async fn create_subscription(
        &self,
        user_id: &str,
        tier: TierName,
    ) -> Result<Option<UserSubscription>> {
        let mut tables = self.tables.write();
        if tables.subscriptions.iter().any(|s| s.user_id == user_id) {
            return Ok(None);
        }
        let subscription = UserSubscription {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            tier,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_subscription_item_id: None,
        };
        tables.subscriptions.push(subscription.clone());
        Ok(Some(subscription))
    }

    async fn update_subscription_tier(
        &self,
        user_id: &str,
        tier: TierName,
    ) -> Result<Option<UserSubscription>> {
        let mut tables = self.tables.write();
        Ok(tables
            .subscriptions
            .iter_mut()
            .find(|s| s.user_id == user_id)
            .map(|s| {
                s.tier = tier;
                s.clone()
            }))
    }

    async fn delete_user(&self, user_id: &str) -> Result<DeletedUser> {
        let mut tables = self.tables.write();
        let subscription_ids = tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        tables.subscriptions.retain(|s| s.user_id != user_id);

        let product_ids: Vec<Uuid> = tables
            .products
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id)
            .collect();
        for id in &product_ids {
            tables.remove_product(*id);
        }

        Ok(DeletedUser {
            subscription_ids,
            product_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, url: &str) -> ProductDetails {
        ProductDetails {
            name: name.to_string(),
            url: url.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_product_adds_default_customization() {
        let repo = InMemoryRepository::new();
        let product = repo.create_product("u1", &details("A", "https://a.test")).await.unwrap();

        let customization = repo.product_customization(product.id, "u1").await.unwrap();
        assert!(customization.unwrap().is_sticky);
        assert!(repo.product_customization(product.id, "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_products_newest_first_with_limit() {
        let repo = InMemoryRepository::new();
        repo.create_product("u1", &details("old", "https://a.test")).await.unwrap();
        repo.create_product("u1", &details("new", "https://b.test")).await.unwrap();
        repo.create_product("u2", &details("other", "https://c.test")).await.unwrap();

        let products = repo.products_for_user("u1", None).await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "new");

        let limited = repo.products_for_user("u1", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(repo.product_count("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_product_cascades() {
        let repo = InMemoryRepository::new();
        let group = repo.seed_country_group("Group 1", Some(0.2)).unwrap();
        let product = repo.create_product("u1", &details("A", "https://a.test")).await.unwrap();
        let discount = CountryGroupDiscount {
            country_group_id: group.id,
            product_id: product.id,
            coupon: "SAVE".to_string(),
            discount_percentage: 0.2,
        };
        repo.replace_country_discounts(product.id, &[discount], &[]).await.unwrap();
        repo.insert_product_view(product.id, None).await.unwrap();

        assert!(!repo.delete_product(product.id, "u2").await.unwrap());
        assert!(repo.delete_product(product.id, "u1").await.unwrap());
        assert!(repo.discounts_for_country(product.id, "US").await.unwrap().is_empty());
        assert_eq!(repo.view_total(), 0);
        assert!(!repo.delete_product(product.id, "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_discount_upsert_keeps_one_row_per_group() {
        let repo = InMemoryRepository::new();
        let group = repo.seed_country_group("Group 1", None).unwrap();
        let product = repo.create_product("u1", &details("A", "https://a.test")).await.unwrap();
        let mut discount = CountryGroupDiscount {
            country_group_id: group.id,
            product_id: product.id,
            coupon: "A".to_string(),
            discount_percentage: 0.1,
        };
        repo.replace_country_discounts(product.id, &[discount.clone()], &[]).await.unwrap();
        discount.coupon = "B".to_string();
        repo.replace_country_discounts(product.id, &[discount], &[]).await.unwrap();

        let candidates = repo.discounts_for_country(product.id, "XX").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].coupon, "B");
        assert!(candidates[0].countries.is_empty());

        let removed = repo.replace_country_discounts(product.id, &[], &[group.id]).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_discount_for_unknown_group_is_rejected() {
        let repo = InMemoryRepository::new();
        let product = repo.create_product("u1", &details("A", "https://a.test")).await.unwrap();
        let discount = CountryGroupDiscount {
            country_group_id: Uuid::new_v4(),
            product_id: product.id,
            coupon: "A".to_string(),
            discount_percentage: 0.1,
        };
        let err = repo
            .replace_country_discounts(product.id, &[discount], &[])
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ParityError>(), Some(ParityError::Repository(_))));
    }

    #[test]
    fn test_country_codes_are_unique() {
        let repo = InMemoryRepository::new();
        let a = repo.seed_country_group("A", None).unwrap();
        let b = repo.seed_country_group("B", None).unwrap();
        repo.seed_country(a.id, "Canada", "CA").unwrap();
        assert!(repo.seed_country(b.id, "Canada 2", "CA").is_err());
        assert!(repo.seed_country_group("A", None).is_err());
    }

    #[tokio::test]
    async fn test_subscription_is_created_once() {
        let repo = InMemoryRepository::new();
        assert!(repo.create_subscription("u1", TierName::Free).await.unwrap().is_some());
        assert!(repo.create_subscription("u1", TierName::Basic).await.unwrap().is_none());
        assert_eq!(repo.subscription("u1").await.unwrap().unwrap().tier, TierName::Free);
    }

    #[tokio::test]
    async fn test_view_count_only_counts_owned_products_since() {
        let repo = InMemoryRepository::new();
        let mine = repo.create_product("u1", &details("A", "https://a.test")).await.unwrap();
        let theirs = repo.create_product("u2", &details("B", "https://b.test")).await.unwrap();
        repo.insert_product_view(mine.id, None).await.unwrap();
        repo.insert_product_view(mine.id, None).await.unwrap();
        repo.insert_product_view(theirs.id, None).await.unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        assert_eq!(repo.product_view_count("u1", since).await.unwrap(), 2);
        let later = Utc::now() + chrono::Duration::days(1);
        assert_eq!(repo.product_view_count("u1", later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_user_reports_removed_rows() {
        let repo = InMemoryRepository::new();
        repo.create_subscription("u1", TierName::Free).await.unwrap();
        let product = repo.create_product("u1", &details("A", "https://a.test")).await.unwrap();

        let deleted = repo.delete_user("u1").await.unwrap();
        assert_eq!(deleted.product_ids, vec![product.id]);
        assert_eq!(deleted.subscription_ids.len(), 1);
        assert!(repo.subscription("u1").await.unwrap().is_none());
    }
}
