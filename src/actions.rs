//! Mutations
//!
//! Each mutation commits through the repository and then revalidates the
//! cache exactly once, and only if a row actually changed. User-facing
//! mutations report authorization and validation failures as an
//! [`ActionOutcome`]; `Err` is reserved for failures of the system itself.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cached_query::RequestContext;
use crate::invalidation::{InvalidationDispatcher, Revalidation};
use crate::models::{
    CountryGroupDiscount, CustomizationUpdate, DeletedUser, ProductDetails, ProductView,
    UserSubscription,
};
use crate::permissions::SubscriptionGate;
use crate::repository::Repository;
use crate::tags::CacheTopic;
use crate::tiers::TierName;

/// Result shown to the acting user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
            redirect_to: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            redirect_to: None,
        }
    }

    fn from_changed(changed: bool, success: &str, failure: &str) -> Self {
        if changed {
            Self::success(success)
        } else {
            Self::failure(failure)
        }
    }
}

/// Discount form row for one country group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryDiscountInput {
    pub country_group_id: Uuid,
    pub coupon: Option<String>,
    /// Whole percent
    pub discount_percentage: Option<u32>,
}

/// Split form rows into rows to upsert and groups whose discount is removed
fn split_discounts(
    product_id: Uuid,
    groups: &[CountryDiscountInput],
) -> (Vec<CountryGroupDiscount>, Vec<Uuid>) {
    let mut upserts = Vec::new();
    let mut removed = Vec::new();
    for group in groups {
        let coupon = group.coupon.as_deref().map(str::trim).unwrap_or_default();
        match group.discount_percentage {
            Some(percent) if percent > 0 && !coupon.is_empty() => upserts.push(CountryGroupDiscount {
                country_group_id: group.country_group_id,
                product_id,
                coupon: coupon.to_string(),
                discount_percentage: f64::from(percent.min(100)) / 100.0,
            }),
            _ => removed.push(group.country_group_id),
        }
    }
    (upserts, removed)
}

/// Redirect after a product is created
#[must_use]
pub fn product_edit_path(product_id: Uuid) -> String {
    format!("/dashboard/products/{product_id}/edit?tab=countries")
}

/// Every write the system performs
#[derive(Clone)]
pub struct Actions {
    repository: Arc<dyn Repository>,
    gate: SubscriptionGate,
    dispatcher: InvalidationDispatcher,
}

impl Actions {
    pub fn new(
        repository: Arc<dyn Repository>,
        gate: SubscriptionGate,
        dispatcher: InvalidationDispatcher,
    ) -> Self {
        Self {
            repository,
            gate,
            dispatcher,
        }
    }

    fn products_changed(user_id: &str, product_id: Uuid) -> Revalidation {
        Revalidation::topic(CacheTopic::Products)
            .user(user_id)
            .entity(product_id)
    }

    /// Create a product with its default customization
    ///
    /// # Errors
    ///
    /// Returns an error if the user has no subscription or the repository
    /// fails.
    pub async fn create_product(
        &self,
        ctx: &RequestContext,
        user_id: Option<&str>,
        details: &ProductDetails,
    ) -> Result<ActionOutcome> {
        const FAILURE: &str = "There was an error creating your product";

        let (Some(user_id), Some(details)) = (user_id, details.normalized()) else {
            return Ok(ActionOutcome::failure(FAILURE));
        };
        if !self.gate.can_create_product(ctx, Some(user_id)).await? {
            info!(user_id = %user_id, "Product limit reached");
            return Ok(ActionOutcome::failure(FAILURE));
        }

        let product = self.repository.create_product(user_id, &details).await?;
        self.dispatcher
            .revalidate(Self::products_changed(user_id, product.id))
            .await;
        // Later reads in this request must see the new product
        ctx.clear();

        Ok(ActionOutcome {
            redirect_to: Some(product_edit_path(product.id)),
            ..ActionOutcome::success("Product created")
        })
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn update_product(
        &self,
        user_id: Option<&str>,
        product_id: Uuid,
        details: &ProductDetails,
    ) -> Result<ActionOutcome> {
        const FAILURE: &str = "There was an error updating your product";

        let (Some(user_id), Some(details)) = (user_id, details.normalized()) else {
            return Ok(ActionOutcome::failure(FAILURE));
        };
        let changed = self
            .repository
            .update_product(product_id, user_id, &details)
            .await?;
        if changed {
            self.dispatcher
                .revalidate(Self::products_changed(user_id, product_id))
                .await;
        }
        Ok(ActionOutcome::from_changed(changed, "Product details updated", FAILURE))
    }

    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn delete_product(&self, user_id: Option<&str>, product_id: Uuid) -> Result<ActionOutcome> {
        const FAILURE: &str = "There was an error deleting your product";

        let Some(user_id) = user_id else {
            return Ok(ActionOutcome::failure(FAILURE));
        };
        let deleted = self.repository.delete_product(product_id, user_id).await?;
        if deleted {
            self.dispatcher
                .revalidate(Self::products_changed(user_id, product_id))
                .await;
        }
        Ok(ActionOutcome::from_changed(
            deleted,
            "Successfully deleted your product",
            FAILURE,
        ))
    }

    /// Replace the product's discounts with the submitted form
    ///
    /// Groups with a coupon and a positive percentage are saved, every other
    /// submitted group loses its discount.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn update_country_discounts(
        &self,
        user_id: Option<&str>,
        product_id: Uuid,
        groups: &[CountryDiscountInput],
    ) -> Result<ActionOutcome> {
        const FAILURE: &str = "There was an error saving your country discounts";

        let Some(user_id) = user_id else {
            return Ok(ActionOutcome::failure(FAILURE));
        };
        if self.repository.product(product_id, user_id).await?.is_none() {
            return Ok(ActionOutcome::failure(FAILURE));
        }

        let (upserts, removed) = split_discounts(product_id, groups);
        let touched = self
            .repository
            .replace_country_discounts(product_id, &upserts, &removed)
            .await?;
        debug!(product_id = %product_id, saved = upserts.len(), touched, "Saved country discounts");
        if touched > 0 {
            self.dispatcher
                .revalidate(Self::products_changed(user_id, product_id))
                .await;
        }
        Ok(ActionOutcome::success("Country discounts saved"))
    }

    /// # Errors
    ///
    /// Returns an error if the user has no subscription or the repository
    /// fails.
    pub async fn update_product_customization(
        &self,
        ctx: &RequestContext,
        user_id: Option<&str>,
        product_id: Uuid,
        update: &CustomizationUpdate,
    ) -> Result<ActionOutcome> {
        const FAILURE: &str = "There was an error updating your banner";

        let Some(user_id) = user_id else {
            return Ok(ActionOutcome::failure(FAILURE));
        };
        if !self.gate.can_customize_banner(ctx, Some(user_id)).await? {
            info!(user_id = %user_id, "Banner customization not included in tier");
            return Ok(ActionOutcome::failure(FAILURE));
        }
        if self.repository.product(product_id, user_id).await?.is_none() {
            return Ok(ActionOutcome::failure(FAILURE));
        }

        let changed = self
            .repository
            .update_product_customization(product_id, user_id, update)
            .await?;
        if changed {
            self.dispatcher
                .revalidate(Self::products_changed(user_id, product_id))
                .await;
            ctx.clear();
        }
        Ok(ActionOutcome::success("Banner updated"))
    }

    /// Record a banner impression for a product owned by `owner_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn record_product_view(
        &self,
        product_id: Uuid,
        country_id: Option<Uuid>,
        owner_id: &str,
    ) -> Result<ProductView> {
        let view = self
            .repository
            .insert_product_view(product_id, country_id)
            .await?;
        self.dispatcher
            .revalidate(
                Revalidation::topic(CacheTopic::ProductViews)
                    .user(owner_id)
                    .entity(view.id),
            )
            .await;
        Ok(view)
    }

    /// Give a new user the default tier; a no-op for existing users
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn provision_user(&self, user_id: &str) -> Result<Option<UserSubscription>> {
        let created = self
            .repository
            .create_subscription(user_id, TierName::default())
            .await?;
        if let Some(subscription) = &created {
            info!(user_id = %user_id, tier = %subscription.tier, "Provisioned subscription");
            self.dispatcher
                .revalidate(
                    Revalidation::topic(CacheTopic::Subscription)
                        .user(user_id)
                        .entity(subscription.id),
                )
                .await;
        }
        Ok(created)
    }

    /// Delete a user's subscription and products
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn delete_user(&self, user_id: &str) -> Result<DeletedUser> {
        let deleted = self.repository.delete_user(user_id).await?;
        info!(
            user_id = %user_id,
            subscriptions = deleted.subscription_ids.len(),
            products = deleted.product_ids.len(),
            "Deleted user data"
        );

        for id in &deleted.subscription_ids {
            self.dispatcher
                .revalidate(
                    Revalidation::topic(CacheTopic::Subscription)
                        .user(user_id)
                        .entity(id),
                )
                .await;
        }
        for id in &deleted.product_ids {
            self.dispatcher
                .revalidate(Self::products_changed(user_id, *id))
                .await;
        }
        Ok(deleted)
    }

    /// Apply a billing change
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn update_subscription_tier(
        &self,
        user_id: &str,
        tier: TierName,
    ) -> Result<Option<UserSubscription>> {
        let updated = self.repository.update_subscription_tier(user_id, tier).await?;
        if let Some(subscription) = &updated {
            self.dispatcher
                .revalidate(
                    Revalidation::topic(CacheTopic::Subscription)
                        .user(user_id)
                        .entity(subscription.id),
                )
                .await;
        }
        Ok(updated)
    }
}
