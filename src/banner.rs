//! Banner service
//!
//! Serves the embeddable banner: `{server}/api/products/{id}/banner` answers
//! with a script that prepends the geo-targeted discount banner to the
//! embedding page.

use anyhow::{Context, Result};
use askama::Template;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::actions::Actions;
use crate::cached_query::RequestContext;
use crate::discount::DiscountResolver;
use crate::models::ProductCustomization;
use crate::permissions::SubscriptionGate;

const BRAND_NAME: &str = "Parity Deals";

/// Banner markup: a style element followed by the banner container
#[derive(Template)]
#[template(path = "banner.html")]
struct BannerTemplate<'a> {
    prefix: &'a str,
    background_color: &'a str,
    text_color: &'a str,
    font_size: &'a str,
    sticky: bool,
    /// Rendered by [`MessageTemplate`], already escaped
    message: &'a str,
    branding_url: Option<&'a str>,
    brand_name: &'a str,
}

/// Location message; template text is kept as markup, values are escaped
#[derive(Template)]
#[template(path = "banner_message.html")]
struct MessageTemplate<'a> {
    parts: Vec<MessagePart<'a>>,
}

struct MessagePart<'a> {
    text: &'a str,
    markup: bool,
}

/// Incoming banner request, taken from the embedding page's request metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerRequest {
    /// Raw path segment; anything that is not a UUID yields no banner
    pub product_id: String,
    /// ISO country code resolved from the request, if any
    pub country_code: Option<String>,
    /// Page the banner is embedded on
    pub referer: Option<String>,
}

/// Everything needed to render one banner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub product_id: Uuid,
    pub customization: ProductCustomization,
    pub country_name: String,
    pub coupon: String,
    /// Whole percent
    pub discount_percentage: u32,
    /// Link target of the "powered by" line; `None` when branding is removed
    pub branding_url: Option<String>,
}

/// Drop characters that could end a CSS declaration or the style element
fn css_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | '{' | '}' | '<' | '>'))
        .collect()
}

/// Keep class prefixes to identifier characters
fn class_prefix(prefix: Option<&str>) -> String {
    prefix
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// JSON string literal that is also safe inside a `<script>` element
fn js_string(text: &str) -> Result<String> {
    let literal = serde_json::to_string(text).context("Failed to encode script string")?;
    Ok(literal.replace("</", "<\\/"))
}

/// `<script>` tag a customer pastes into their site
#[must_use]
pub fn embed_snippet(server_base_url: &str, product_id: Uuid) -> String {
    let base = server_base_url.trim_end_matches('/');
    format!(r#"<script src="{base}/api/products/{product_id}/banner"></script>"#)
}

impl Banner {
    /// Split the location message into template markup and placeholder values
    fn message_parts<'a>(&'a self, discount: &'a str) -> Vec<MessagePart<'a>> {
        let values = [
            ("{country}", self.country_name.as_str()),
            ("{coupon}", self.coupon.as_str()),
            ("{discount}", discount),
        ];
        let mut parts = Vec::new();
        let mut rest = self.customization.location_message.as_str();

        while let Some((at, placeholder, value)) = values
            .iter()
            .filter_map(|(placeholder, value)| rest.find(placeholder).map(|at| (at, *placeholder, *value)))
            .min_by_key(|(at, _, _)| *at)
        {
            let (markup, tail) = rest.split_at(at);
            if !markup.is_empty() {
                parts.push(MessagePart { text: markup, markup: true });
            }
            parts.push(MessagePart { text: value, markup: false });
            rest = tail.split_at(placeholder.len()).1;
        }
        if !rest.is_empty() {
            parts.push(MessagePart { text: rest, markup: true });
        }
        parts
    }

    /// The location message with its placeholders filled in
    ///
    /// The template itself may carry markup; substituted values are escaped.
    ///
    /// # Errors
    ///
    /// Returns an error if the message template fails to render.
    pub fn message(&self) -> Result<String> {
        let discount = self.discount_percentage.to_string();
        MessageTemplate {
            parts: self.message_parts(&discount),
        }
        .render()
        .context("Failed to render banner message")
    }

    /// Banner markup: a style element followed by the banner container
    ///
    /// # Errors
    ///
    /// Returns an error if the banner template fails to render.
    pub fn to_html(&self) -> Result<String> {
        let c = &self.customization;
        let message = self.message()?;
        BannerTemplate {
            prefix: &class_prefix(c.class_prefix.as_deref()),
            background_color: &css_value(&c.background_color),
            text_color: &css_value(&c.text_color),
            font_size: &css_value(&c.font_size),
            sticky: c.is_sticky,
            message: &message,
            branding_url: self.branding_url.as_deref(),
            brand_name: BRAND_NAME,
        }
        .render()
        .context("Failed to render banner")
    }

    /// JavaScript that prepends the banner to the configured container
    ///
    /// # Errors
    ///
    /// Returns an error if the markup cannot be rendered or encoded.
    pub fn to_script(&self) -> Result<String> {
        let html = js_string(&self.to_html()?)?;
        let container = js_string(&self.customization.banner_container)?;
        Ok(format!(
            "(function () {{\n  var banner = document.createElement(\"div\");\n  banner.innerHTML = {html};\n  var target = document.querySelector({container});\n  if (target) target.prepend(...banner.children);\n}})();\n"
        ))
    }
}

/// Answers banner requests
#[derive(Clone)]
pub struct BannerService {
    resolver: DiscountResolver,
    gate: SubscriptionGate,
    actions: Actions,
    server_base_url: String,
    test_country_code: Option<String>,
}

impl BannerService {
    pub fn new(
        resolver: DiscountResolver,
        gate: SubscriptionGate,
        actions: Actions,
        server_base_url: impl Into<String>,
        test_country_code: Option<String>,
    ) -> Self {
        Self {
            resolver,
            gate,
            actions,
            server_base_url: server_base_url.into(),
            test_country_code,
        }
    }

    /// Resolve the banner for a request; `None` means render nothing
    ///
    /// Every request for a known product counts as a view of that product,
    /// whether or not a banner is shown.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or the view insert fails, or the product
    /// owner has no subscription.
    pub async fn banner(&self, ctx: &RequestContext, request: &BannerRequest) -> Result<Option<Banner>> {
        let Some(referer) = request.referer.as_deref() else {
            debug!(product_id = %request.product_id, "Banner request without referer");
            return Ok(None);
        };
        let Some(country_code) = request
            .country_code
            .as_deref()
            .or(self.test_country_code.as_deref())
        else {
            return Ok(None);
        };
        let Ok(product_id) = Uuid::parse_str(&request.product_id) else {
            return Ok(None);
        };

        let resolution = self
            .resolver
            .resolve(ctx, product_id, country_code, referer)
            .await?;
        let Some(resolved) = resolution.product else {
            return Ok(None);
        };
        let owner = resolved.product.user_id.as_str();

        self.actions
            .record_product_view(product_id, resolution.country.as_ref().map(|c| c.id), owner)
            .await?;

        if !self.gate.can_show_discount_banner(ctx, Some(owner)).await? {
            debug!(product_id = %product_id, owner = %owner, "Monthly visit quota exhausted");
            return Ok(None);
        }
        let (Some(country), Some(discount)) = (resolution.country, resolution.discount) else {
            return Ok(None);
        };

        let show_branding = !self.gate.can_remove_branding(ctx, Some(owner)).await?;
        Ok(Some(Banner {
            product_id,
            customization: resolved.customization,
            country_name: country.name,
            coupon: discount.coupon,
            discount_percentage: discount.percentage,
            branding_url: show_branding.then(|| self.server_base_url.clone()),
        }))
    }
}
