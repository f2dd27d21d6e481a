//! JSON Codec using `serde_json`

use crate::traits::CacheCodec;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON Codec using `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl CacheCodec for JsonCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).with_context(|| {
            format!("Failed to encode {} as JSON", std::any::type_name::<T>())
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).with_context(|| {
            format!("Failed to decode JSON as {}", std::any::type_name::<T>())
        })
    }

    fn name(&self) -> &'static str {
        "serde_json"
    }
}
