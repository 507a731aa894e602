use dashmap::DashMap;
use serde_json::Value;

use super::{DataPair, DataType, Storage};

type StorageKey = (String, DataType, String);

/// Storage kept in process memory. Used by tests and by hosts that persist
/// elsewhere.
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<StorageKey, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    async fn init(&self) -> Result<(), String> {
        Ok(())
    }

    async fn save(&self, owner: &str, data_type: DataType, pairs: &[DataPair]) -> Result<(), String> {
        for pair in pairs {
            self.entries
                .insert((owner.to_string(), data_type, pair.key.clone()), pair.data.clone());
        }
        Ok(())
    }

    async fn load(&self, owner: &str, data_type: DataType, key: &str) -> Option<Value> {
        self.entries
            .get(&(owner.to_string(), data_type, key.to_string()))
            .map(|entry| entry.value().clone())
    }

    async fn load_all(&self, owner: &str, data_type: DataType) -> Vec<DataPair> {
        let mut pairs: Vec<DataPair> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == owner && entry.key().1 == data_type)
            .map(|entry| DataPair::new(entry.key().2.clone(), entry.value().clone()))
            .collect();
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        pairs
    }

    async fn owners(&self, data_type: DataType) -> Vec<String> {
        let mut owners: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().1 == data_type)
            .map(|entry| entry.key().0.clone())
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }
}
