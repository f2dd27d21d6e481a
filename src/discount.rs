//! Discount Resolution Engine
//!
//! Given a product id, the visitor's country code and the page the banner is
//! embedded on, resolve at most one discount and the presentation to show
//! it with.
//!
//! Absent results are normal outcomes: an unknown embedding origin yields no
//! product and a country outside every discounted group yields no discount.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cached_query::RequestContext;
use crate::models::{Country, DiscountCandidate, Product, ProductCustomization, normalize_url};
use crate::queries::Queries;

/// A discount in display units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub coupon: String,
    /// Whole percent, `0..=100`
    pub percentage: u32,
}

/// Product and the customization it renders with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProduct {
    pub product: Product,
    pub customization: ProductCustomization,
}

/// Outcome of a resolution; every part is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BannerResolution {
    pub product: Option<ResolvedProduct>,
    pub country: Option<Country>,
    pub discount: Option<Discount>,
}

/// Convert a stored fraction to whole percent
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_whole_percent(fraction: f64) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// First candidate whose group contains the visitor's country
///
/// A country belongs to exactly one group, so more than one match means the
/// data is inconsistent. The first candidate in load order wins and the
/// anomaly is logged.
#[must_use]
pub fn select_discount(candidates: &[DiscountCandidate]) -> Option<&DiscountCandidate> {
    let mut matching = candidates.iter().filter(|c| !c.countries.is_empty());
    let selected = matching.next()?;

    let extra = matching.count();
    if extra > 0 {
        warn!(
            country_group_id = %selected.country_group_id,
            additional_matches = extra,
            "Country matches more than one discount group; using the first"
        );
    }
    Some(selected)
}

/// Resolves banners through cached reads
#[derive(Clone)]
pub struct DiscountResolver {
    queries: Queries,
}

impl DiscountResolver {
    #[must_use]
    pub const fn new(queries: Queries) -> Self {
        Self { queries }
    }

    /// Resolve the banner for `product_id` embedded at `origin_url`
    ///
    /// # Errors
    ///
    /// Returns an error only if a read fails.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        country_code: &str,
        origin_url: &str,
    ) -> Result<BannerResolution> {
        let url = normalize_url(origin_url);

        let Some(found) = self.queries.get_product_by_url(ctx, product_id, url).await? else {
            debug!(product_id = %product_id, url = %url, "No product for embedding origin");
            return Ok(BannerResolution::default());
        };
        let Some(customization) = found.customization else {
            warn!(product_id = %product_id, "Product has no customization; treating as unknown");
            return Ok(BannerResolution::default());
        };

        let candidates = self
            .queries
            .get_discounts_for_country(ctx, product_id, country_code)
            .await?;
        let selected = select_discount(&candidates);

        Ok(BannerResolution {
            product: Some(ResolvedProduct {
                product: found.product,
                customization,
            }),
            country: selected.and_then(|c| c.countries.first().cloned()),
            discount: selected.map(|c| Discount {
                coupon: c.coupon.clone(),
                percentage: to_whole_percent(c.discount_percentage),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn country(code: &str, group: Uuid) -> Country {
        Country {
            id: Uuid::new_v4(),
            name: code.to_string(),
            code: code.to_string(),
            country_group_id: group,
        }
    }

    fn candidate(coupon: &str, countries: Vec<Country>) -> DiscountCandidate {
        DiscountCandidate {
            country_group_id: Uuid::new_v4(),
            coupon: coupon.to_string(),
            discount_percentage: 0.1,
            countries,
        }
    }

    #[test]
    fn test_whole_percent() {
        assert_eq!(to_whole_percent(0.1), 10);
        assert_eq!(to_whole_percent(0.15), 15);
        assert_eq!(to_whole_percent(0.125), 13);
        assert_eq!(to_whole_percent(0.0), 0);
        assert_eq!(to_whole_percent(1.0), 100);
    }

    #[test]
    fn test_no_match_selects_nothing() {
        let candidates = vec![candidate("A", vec![]), candidate("B", vec![])];
        assert!(select_discount(&candidates).is_none());
        assert!(select_discount(&[]).is_none());
    }

    #[test]
    fn test_multiple_matches_pick_first_in_load_order() {
        let g = Uuid::new_v4();
        let candidates = vec![
            candidate("NONE", vec![]),
            candidate("FIRST", vec![country("CA", g)]),
            candidate("SECOND", vec![country("CA", g)]),
        ];
        assert_eq!(select_discount(&candidates).unwrap().coupon, "FIRST");
    }
}
