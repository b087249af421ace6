//! Persistence of tower records.
//!
//! [`TowerStore`] is the contract both the geolocation engine and the import
//! pipeline talk to. Records are addressed by [`TowerKey`], which is unique
//! within a store; writing an existing key overwrites its location and
//! accuracy.

use std::ops::{Add, AddAssign};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{RadioType, TowerKey, TowerRecord};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to migrate database: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Lookup of every tower sharing a radio, country and network whose
/// (area, cell) pair is one of `cells`.
#[derive(Debug, Clone, PartialEq)]
pub struct TowerQuery {
    pub radio: RadioType,
    pub mcc: u16,
    pub mnc: u16,
    /// (location area code, cell id) pairs, any of which may match.
    pub cells: Vec<(u16, u32)>,
}

impl TowerQuery {
    pub fn matches(&self, key: &TowerKey) -> bool {
        key.radio == self.radio
            && key.mcc == self.mcc
            && key.mnc == self.mnc
            && self.cells.contains(&(key.lac, key.cell))
    }
}

/// Result of applying one batch of upserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Keys that did not exist before.
    pub inserted: u64,
    /// Keys whose existing record was overwritten.
    pub modified: u64,
    /// Entries refused because the record is not valid.
    pub failed: u64,
}

impl Add for BatchOutcome {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            inserted: self.inserted + other.inserted,
            modified: self.modified + other.modified,
            failed: self.failed + other.failed,
        }
    }
}

impl AddAssign for BatchOutcome {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

#[async_trait]
pub trait TowerStore: Send + Sync {
    /// Location and accuracy of every tower matching `query`, in whatever
    /// order the store yields them.
    async fn find(&self, query: &TowerQuery) -> Result<Vec<TowerRecord>, StoreError>;

    /// Insert or overwrite each entry. Entries are applied in no particular
    /// order; when a key repeats the last entry wins.
    async fn upsert_batch(
        &self,
        batch: &[(TowerKey, TowerRecord)],
    ) -> Result<BatchOutcome, StoreError>;

    /// Delete every record, returning how many were removed.
    async fn purge(&self) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(lac: u16, cell: u32) -> TowerKey {
        TowerKey {
            radio: RadioType::Gsm,
            mcc: 250,
            mnc: 2,
            lac,
            cell,
        }
    }

    #[test]
    fn query_matches_any_pair() {
        let query = TowerQuery {
            radio: RadioType::Gsm,
            mcc: 250,
            mnc: 2,
            cells: vec![(7743, 22517), (7743, 39696)],
        };
        assert!(query.matches(&key(7743, 22517)));
        assert!(query.matches(&key(7743, 39696)));
        assert!(!query.matches(&key(7744, 22517)));
        assert!(!query.matches(&TowerKey {
            radio: RadioType::Lte,
            ..key(7743, 22517)
        }));
        assert!(!query.matches(&TowerKey {
            mnc: 1,
            ..key(7743, 22517)
        }));
    }

    #[test]
    fn outcomes_add_up() {
        let mut total = BatchOutcome::default();
        total += BatchOutcome {
            inserted: 3,
            modified: 1,
            failed: 0,
        };
        total += BatchOutcome {
            inserted: 1,
            modified: 0,
            failed: 2,
        };
        assert_eq!(
            total,
            BatchOutcome {
                inserted: 4,
                modified: 1,
                failed: 2
            }
        );
    }
}
