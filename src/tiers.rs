//! Subscription tiers and their limits

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TierName {
    #[default]
    Free,
    Basic,
    Standard,
    Premium,
}

impl TierName {
    pub const ALL: [Self; 4] = [Self::Free, Self::Basic, Self::Standard, Self::Premium];

    /// Quota and feature flags of this tier
    #[must_use]
    pub const fn limits(self) -> SubscriptionTier {
        match self {
            Self::Free => SubscriptionTier {
                name: self,
                price_in_cents: 0,
                max_products: 1,
                max_monthly_visits: 5_000,
                can_access_analytics: false,
                can_customize_banner: false,
                can_remove_branding: false,
            },
            Self::Basic => SubscriptionTier {
                name: self,
                price_in_cents: 1_900,
                max_products: 5,
                max_monthly_visits: 10_000,
                can_access_analytics: true,
                can_customize_banner: false,
                can_remove_branding: true,
            },
            Self::Standard => SubscriptionTier {
                name: self,
                price_in_cents: 4_900,
                max_products: 30,
                max_monthly_visits: 100_000,
                can_access_analytics: true,
                can_customize_banner: true,
                can_remove_branding: true,
            },
            Self::Premium => SubscriptionTier {
                name: self,
                price_in_cents: 9_900,
                max_products: 50,
                max_monthly_visits: 1_000_000,
                can_access_analytics: true,
                can_customize_banner: true,
                can_remove_branding: true,
            },
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Free => "Free",
            Self::Basic => "Basic",
            Self::Standard => "Standard",
            Self::Premium => "Premium",
        };
        f.write_str(name)
    }
}

/// Resolved tier record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub name: TierName,
    pub price_in_cents: u32,
    pub max_products: u64,
    pub max_monthly_visits: u64,
    pub can_access_analytics: bool,
    pub can_customize_banner: bool,
    pub can_remove_branding: bool,
}
