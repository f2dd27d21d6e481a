//! Data model
//!
//! Records as the repository returns them. All of them are serializable so
//! they can be stored in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tiers::TierName;

/// Default banner message; `{country}`, `{coupon}` and `{discount}` are
/// replaced when the banner is rendered
pub const DEFAULT_LOCATION_MESSAGE: &str = "Hey! It looks like you are from <b>{country}</b>. We support Parity Purchasing Power, so if you need it, use code <b>\u{201c}{coupon}\u{201d}</b> to get <b>{discount}%</b> off.";

/// Strip one trailing slash, the canonical form of product URLs
#[must_use]
pub fn normalize_url(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    /// Normalized, no trailing slash
    pub url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product looked up for an embedding origin; rendering needs the
/// customization, which may be missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerProduct {
    pub product: Product,
    pub customization: Option<ProductCustomization>,
}

/// Editable product fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

impl ProductDetails {
    /// Trimmed, URL-normalized copy; `None` when a required field is empty
    #[must_use]
    pub fn normalized(&self) -> Option<Self> {
        let name = self.name.trim();
        let url = normalize_url(self.url.trim());
        if name.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            url: url.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}

/// Banner presentation for a product, exactly one per product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCustomization {
    pub id: Uuid,
    pub product_id: Uuid,
    pub class_prefix: Option<String>,
    pub location_message: String,
    pub background_color: String,
    pub text_color: String,
    pub font_size: String,
    /// CSS selector of the element the banner is prepended to
    pub banner_container: String,
    pub is_sticky: bool,
}

impl ProductCustomization {
    /// Default customization created alongside a product
    #[must_use]
    pub fn default_for(product_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            class_prefix: None,
            location_message: DEFAULT_LOCATION_MESSAGE.to_string(),
            background_color: "hsl(193, 82%, 31%)".to_string(),
            text_color: "hsl(0, 0%, 100%)".to_string(),
            font_size: "1rem".to_string(),
            banner_container: "body".to_string(),
            is_sticky: true,
        }
    }

    /// Apply an update, returning whether anything changed
    pub fn apply(&mut self, update: &CustomizationUpdate) -> bool {
        let before = self.clone();
        if let Some(class_prefix) = &update.class_prefix {
            self.class_prefix = Some(class_prefix.clone()).filter(|p| !p.is_empty());
        }
        if let Some(message) = &update.location_message {
            self.location_message.clone_from(message);
        }
        if let Some(color) = &update.background_color {
            self.background_color.clone_from(color);
        }
        if let Some(color) = &update.text_color {
            self.text_color.clone_from(color);
        }
        if let Some(size) = &update.font_size {
            self.font_size.clone_from(size);
        }
        if let Some(container) = &update.banner_container {
            self.banner_container.clone_from(container);
        }
        if let Some(sticky) = update.is_sticky {
            self.is_sticky = sticky;
        }
        *self != before
    }
}

/// Partial customization update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationUpdate {
    pub class_prefix: Option<String>,
    pub location_message: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub font_size: Option<String>,
    pub banner_container: Option<String>,
    pub is_sticky: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: Uuid,
    pub name: String,
    /// ISO 3166-1 alpha-2, upper case
    pub code: String,
    pub country_group_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryGroup {
    pub id: Uuid,
    pub name: String,
    /// Fraction in `[0, 1]`
    pub recommended_discount_percentage: Option<f64>,
}

/// Discount for one (product, country group) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryGroupDiscount {
    pub country_group_id: Uuid,
    pub product_id: Uuid,
    pub coupon: String,
    /// Fraction in `[0, 1]`
    pub discount_percentage: f64,
}

/// A product's discount row joined to the countries of its group that match
/// the visitor's country code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountCandidate {
    pub country_group_id: Uuid,
    pub coupon: String,
    /// Fraction in `[0, 1]`
    pub discount_percentage: f64,
    pub countries: Vec<Country>,
}

/// A country group with its countries and the product's discount, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryGroupWithDiscount {
    pub group: CountryGroup,
    pub countries: Vec<Country>,
    pub discount: Option<CountryGroupDiscount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: String,
    pub tier: TierName,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_subscription_item_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub country_id: Option<Uuid>,
    pub visited_at: DateTime<Utc>,
}

/// Ids removed by a user deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedUser {
    pub subscription_ids: Vec<Uuid>,
    pub product_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_strips_one_slash() {
        assert_eq!(normalize_url("https://shop.test/"), "https://shop.test");
        assert_eq!(normalize_url("https://shop.test"), "https://shop.test");
        assert_eq!(normalize_url("https://shop.test/a//"), "https://shop.test/a/");
    }

    #[test]
    fn test_details_normalization() {
        let details = ProductDetails {
            name: "  Course ".to_string(),
            url: "https://course.test/".to_string(),
            description: Some("   ".to_string()),
        };
        let normalized = details.normalized().unwrap();
        assert_eq!(normalized.name, "Course");
        assert_eq!(normalized.url, "https://course.test");
        assert_eq!(normalized.description, None);

        let empty = ProductDetails {
            name: " ".to_string(),
            ..details
        };
        assert!(empty.normalized().is_none());
    }

    #[test]
    fn test_customization_apply_reports_changes() {
        let mut customization = ProductCustomization::default_for(Uuid::new_v4());
        assert!(!customization.apply(&CustomizationUpdate::default()));

        let update = CustomizationUpdate {
            is_sticky: Some(false),
            ..CustomizationUpdate::default()
        };
        assert!(customization.apply(&update));
        assert!(!customization.is_sticky);
        assert!(!customization.apply(&update));
    }
}
