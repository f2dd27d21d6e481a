//! Subscription Tier Gate
//!
//! Pure predicates over a resolved tier, plus [`SubscriptionGate`] which
//! resolves the tier and live counts through cached reads. An anonymous user
//! is never allowed anything; a provisioned user without a subscription is
//! an error, not a denial.

use anyhow::Result;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::debug;

use crate::cached_query::RequestContext;
use crate::queries::Queries;
use crate::tiers::SubscriptionTier;

#[must_use]
pub const fn can_create_product(tier: &SubscriptionTier, product_count: u64) -> bool {
    product_count < tier.max_products
}

#[must_use]
pub const fn can_remove_branding(tier: &SubscriptionTier) -> bool {
    tier.can_remove_branding
}

#[must_use]
pub const fn can_customize_banner(tier: &SubscriptionTier) -> bool {
    tier.can_customize_banner
}

#[must_use]
pub const fn can_access_analytics(tier: &SubscriptionTier) -> bool {
    tier.can_access_analytics
}

#[must_use]
pub const fn can_show_discount_banner(tier: &SubscriptionTier, views_this_month: u64) -> bool {
    views_this_month < tier.max_monthly_visits
}

/// Midnight UTC on the first day of `now`'s month
#[must_use]
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Permission checks for a possibly anonymous user
#[derive(Clone)]
pub struct SubscriptionGate {
    queries: Queries,
}

impl SubscriptionGate {
    #[must_use]
    pub const fn new(queries: Queries) -> Self {
        Self { queries }
    }

    async fn tier(&self, ctx: &RequestContext, user_id: Option<&str>) -> Result<Option<SubscriptionTier>> {
        match user_id {
            Some(user_id) => Ok(Some(self.queries.get_user_subscription_tier(ctx, user_id).await?)),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the user has no subscription or a read fails.
    pub async fn can_create_product(&self, ctx: &RequestContext, user_id: Option<&str>) -> Result<bool> {
        let (Some(user_id), Some(tier)) = (user_id, self.tier(ctx, user_id).await?) else {
            return Ok(false);
        };
        let count = self.queries.get_product_count(ctx, user_id).await?;
        let allowed = can_create_product(&tier, count);
        debug!(user_id = %user_id, tier = %tier.name, count, allowed, "Checked product quota");
        Ok(allowed)
    }

    /// # Errors
    ///
    /// Returns an error if the user has no subscription or a read fails.
    pub async fn can_remove_branding(&self, ctx: &RequestContext, user_id: Option<&str>) -> Result<bool> {
        Ok(self.tier(ctx, user_id).await?.is_some_and(|t| can_remove_branding(&t)))
    }

    /// # Errors
    ///
    /// Returns an error if the user has no subscription or a read fails.
    pub async fn can_customize_banner(&self, ctx: &RequestContext, user_id: Option<&str>) -> Result<bool> {
        Ok(self.tier(ctx, user_id).await?.is_some_and(|t| can_customize_banner(&t)))
    }

    /// # Errors
    ///
    /// Returns an error if the user has no subscription or a read fails.
    pub async fn can_access_analytics(&self, ctx: &RequestContext, user_id: Option<&str>) -> Result<bool> {
        Ok(self.tier(ctx, user_id).await?.is_some_and(|t| can_access_analytics(&t)))
    }

    /// Whether the user's products still get banners this month
    ///
    /// # Errors
    ///
    /// Returns an error if the user has no subscription or a read fails.
    pub async fn can_show_discount_banner(&self, ctx: &RequestContext, user_id: Option<&str>) -> Result<bool> {
        let (Some(user_id), Some(tier)) = (user_id, self.tier(ctx, user_id).await?) else {
            return Ok(false);
        };
        let views = self
            .queries
            .get_product_view_count(ctx, user_id, start_of_month(Utc::now()))
            .await?;
        Ok(can_show_discount_banner(&tier, views))
    }
}
