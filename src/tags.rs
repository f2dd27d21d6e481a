//! Cache Tags
//!
//! Deterministic tag identifiers used to label cache entries for selective
//! invalidation. Three granularities are available for every topic:
//!
//! - **Global**: data shared by everybody (`global:products`)
//! - **User**: data scoped to one user (`user:user_42-products`)
//! - **Entity**: data scoped to a single record (`id:7f0c…-products`)
//!
//! Every entry also carries the reserved [`CacheTag::Wildcard`] tag so the
//! whole cache can be flushed independently of topic.
//!
//! # Example
//!
//! ```rust
//! use parity_deals::tags::{CacheTopic, global_tag, user_tag, entity_tag};
//!
//! assert_eq!(global_tag(CacheTopic::Products).to_string(), "global:products");
//! assert_eq!(user_tag("u1", CacheTopic::Subscription).to_string(), "user:u1-subscription");
//! assert_eq!(entity_tag("p1", CacheTopic::Products).to_string(), "id:p1-products");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of cached data categories.
///
/// Topic names never contain `-`, which keeps `"<scope>:<id>-<topic>"`
/// unambiguous: the topic is always the suffix after the last `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheTopic {
    Products,
    ProductViews,
    Subscription,
    Countries,
    CountryGroups,
}

impl CacheTopic {
    /// Every registered topic, in declaration order
    pub const ALL: [Self; 5] = [
        Self::Products,
        Self::ProductViews,
        Self::Subscription,
        Self::Countries,
        Self::CountryGroups,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::ProductViews => "productViews",
            Self::Subscription => "subscription",
            Self::Countries => "countries",
            Self::CountryGroups => "countryGroups",
        }
    }
}

impl fmt::Display for CacheTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag scope, as it appears before the `:` of a serialized tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagScope {
    Global,
    User,
    Entity,
}

/// A cache tag: a scope, an optional scope id and a topic.
///
/// Two tags are equal iff their serialized strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTag {
    Global(CacheTopic),
    User { user_id: String, topic: CacheTopic },
    Entity { id: String, topic: CacheTopic },
    /// Reserved flush-all tag attached to every entry
    Wildcard,
}

impl CacheTag {
    /// Scope of this tag, `None` for the wildcard
    #[must_use]
    pub const fn scope(&self) -> Option<TagScope> {
        match self {
            Self::Global(_) => Some(TagScope::Global),
            Self::User { .. } => Some(TagScope::User),
            Self::Entity { .. } => Some(TagScope::Entity),
            Self::Wildcard => None,
        }
    }

    /// Topic of this tag, `None` for the wildcard
    #[must_use]
    pub const fn topic(&self) -> Option<CacheTopic> {
        match self {
            Self::Global(topic) | Self::User { topic, .. } | Self::Entity { topic, .. } => {
                Some(*topic)
            }
            Self::Wildcard => None,
        }
    }

    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global(topic) => write!(f, "global:{topic}"),
            Self::User { user_id, topic } => write!(f, "user:{user_id}-{topic}"),
            Self::Entity { id, topic } => write!(f, "id:{id}-{topic}"),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

/// Tag for data shared across all users (e.g. every product)
#[must_use]
pub const fn global_tag(topic: CacheTopic) -> CacheTag {
    CacheTag::Global(topic)
}

/// Tag for one user's data (e.g. a user's products)
#[must_use]
pub fn user_tag(user_id: impl Into<String>, topic: CacheTopic) -> CacheTag {
    CacheTag::User {
        user_id: user_id.into(),
        topic,
    }
}

/// Tag for a single record (e.g. one product)
#[must_use]
pub fn entity_tag(id: impl ToString, topic: CacheTopic) -> CacheTag {
    CacheTag::Entity {
        id: id.to_string(),
        topic,
    }
}

/// The reserved flush-all tag
#[must_use]
pub const fn wildcard_tag() -> CacheTag {
    CacheTag::Wildcard
}
