use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BatchOutcome, StoreError, TowerQuery, TowerStore};
use crate::model::{TowerKey, TowerRecord};

/// In-process store. Records are kept in key order, which is also the order
/// `find` returns them in.
#[derive(Debug, Default)]
pub struct MemoryStore {
    towers: RwLock<BTreeMap<TowerKey, TowerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_towers<I>(towers: I) -> Self
    where
        I: IntoIterator<Item = (TowerKey, TowerRecord)>,
    {
        Self {
            towers: RwLock::new(towers.into_iter().collect()),
        }
    }

    pub async fn get(&self, key: &TowerKey) -> Option<TowerRecord> {
        self.towers.read().await.get(key).copied()
    }

    /// Copy of every stored entry in key order.
    pub async fn snapshot(&self) -> Vec<(TowerKey, TowerRecord)> {
        self.towers
            .read()
            .await
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect()
    }
}

#[async_trait]
impl TowerStore for MemoryStore {
    async fn find(&self, query: &TowerQuery) -> Result<Vec<TowerRecord>, StoreError> {
        let towers = self.towers.read().await;
        Ok(towers
            .iter()
            .filter(|(key, _)| query.matches(key))
            .map(|(_, record)| *record)
            .collect())
    }

    async fn upsert_batch(
        &self,
        batch: &[(TowerKey, TowerRecord)],
    ) -> Result<BatchOutcome, StoreError> {
        let mut towers = self.towers.write().await;
        let mut outcome = BatchOutcome::default();
        for (key, record) in batch {
            if !record.is_valid() {
                outcome.failed += 1;
                continue;
            }
            match towers.insert(*key, *record) {
                Some(_) => outcome.modified += 1,
                None => outcome.inserted += 1,
            }
        }
        Ok(outcome)
    }

    async fn purge(&self) -> Result<u64, StoreError> {
        let mut towers = self.towers.write().await;
        let removed = towers.len() as u64;
        towers.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.towers.read().await.len() as u64)
    }
}
