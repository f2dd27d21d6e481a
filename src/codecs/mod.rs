//! Cache Codec Implementations
//!
//! This module provides built-in implementations of the [`CacheCodec`](crate::traits::CacheCodec) trait.
//! Cached query results are stored as bytes so a single backend can hold
//! values of every query type.

mod json;
pub use json::JsonCodec;
