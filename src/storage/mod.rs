//! Persistence
//!
//! A key/value store keyed by owner (an entity id), data category and key.
//! Saves report failure as an error string; loads treat any failure as
//! "data unavailable".

pub mod image;
pub mod memory;
pub mod sqlite;

use std::fmt;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub use image::{AreaImageBuilder, ImageBuilder, PlayerImageBuilder, QuestImage, QuestImageBuilder};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Logical record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Quest,
    Player,
    Area,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Quest => "quest",
            DataType::Player => "player",
            DataType::Area => "area",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPair {
    pub key: String,
    pub data: Value,
}

impl DataPair {
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }

    /// Serialize `value` under `key`
    pub fn encode<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self, String> {
        let key = key.into();
        let data = serde_json::to_value(value)
            .map_err(|e| format!("Failed to encode '{}': {}", key, e))?;
        Ok(Self { key, data })
    }

    /// Deserialize the stored value, logging when it does not fit `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        decode(&self.key, self.data.clone())
    }
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Stored value '{}' could not be decoded: {}", key, e);
            None
        }
    }
}

/// Backing store for quest, player and area data
pub trait Storage: Send + Sync + 'static {
    /// Prepare the store, e.g. create tables
    fn init(&self) -> impl Future<Output = Result<(), String>> + Send;

    /// Write all pairs for `owner`, or none of them
    fn save(
        &self,
        owner: &str,
        data_type: DataType,
        pairs: &[DataPair],
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn load(
        &self,
        owner: &str,
        data_type: DataType,
        key: &str,
    ) -> impl Future<Output = Option<Value>> + Send;

    /// Every pair stored for `owner`, sorted by key
    fn load_all(&self, owner: &str, data_type: DataType) -> impl Future<Output = Vec<DataPair>> + Send;

    /// Owners with at least one value of `data_type`, sorted
    fn owners(&self, data_type: DataType) -> impl Future<Output = Vec<String>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_encoding() {
        let pair = DataPair::encode("area", &vec![1, 2, 3]).unwrap();
        assert_eq!(pair.data, serde_json::json!([1, 2, 3]));
        assert_eq!(pair.decode::<Vec<u8>>(), Some(vec![1, 2, 3]));
        assert_eq!(pair.decode::<String>(), None);
        assert_eq!(DataType::Player.to_string(), "player");
    }
}
