//! Typed error conditions
//!
//! Most APIs return `anyhow::Result`; the variants here are the conditions
//! callers may want to match on (via `downcast_ref`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParityError {
    /// Every user is provisioned a subscription at creation, so a missing
    /// record means provisioning never ran. Fatal for the request.
    #[error("User {user_id} has no subscription")]
    MissingSubscription { user_id: String },

    /// A data-source constraint was violated
    #[error("Repository constraint violated: {0}")]
    Repository(String),
}

impl ParityError {
    /// True if `err` wraps [`ParityError::MissingSubscription`]
    #[must_use]
    pub fn is_missing_subscription(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<Self>(),
            Some(Self::MissingSubscription { .. })
        )
    }
}
