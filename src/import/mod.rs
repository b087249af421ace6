//! Bulk import of tower coordinates from CSV datasets.
//!
//! An import reads the whole dataset first, keeping only the typed entries of
//! accepted rows, and touches the store afterwards. A full import empties the
//! store before writing; an incremental one only upserts. A dataset that
//! yields no accepted rows leaves the store exactly as it was.

use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::{
    model::{TowerKey, TowerRecord},
    store::{BatchOutcome, StoreError, TowerStore},
};

mod dataset;
mod filter;

pub use dataset::{CellRow, Decoded, RowError, Rows, MIN_COLUMNS};
pub use filter::Filters;

pub const DEFAULT_BATCH_SIZE: usize = 4096;

const PROGRESS_INTERVAL: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open dataset {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read dataset")]
    Read(#[source] csv::Error),
    #[error("dataset header has {columns} columns, expected at least 10")]
    Header { columns: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Replace everything in the store with the dataset.
    Full,
    /// Add and update records, never delete.
    Incremental,
}

impl ImportMode {
    /// Differential exports carry `diff` in their file name.
    pub fn detect(path: &Path) -> Self {
        let diff = path
            .file_name()
            .is_some_and(|x| x.to_string_lossy().contains("diff"));
        if diff {
            Self::Incremental
        } else {
            Self::Full
        }
    }
}

/// Accepted entries of a dataset, ready to be written.
///
/// Every accepted row stays in memory until commit, about 40 bytes each, so a
/// full MLS export of tens of millions of cells needs a few gigabytes.
#[derive(Debug, Default)]
pub struct Staged {
    /// Data rows read, header excluded.
    pub rows: u64,
    pub skipped: u64,
    pub towers: Vec<(TowerKey, TowerRecord)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub rows: u64,
    pub accepted: u64,
    pub skipped: u64,
    /// Records removed before writing, full imports only.
    pub deleted: u64,
    pub outcome: BatchOutcome,
    /// Records in the store once the import finished.
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct Importer {
    filters: Filters,
    mode: ImportMode,
    batch_size: usize,
}

impl Importer {
    pub fn new(filters: Filters, mode: ImportMode) -> Self {
        Self {
            filters,
            mode,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn mode(&self) -> ImportMode {
        self.mode
    }

    /// Open `path` and import it.
    pub async fn run_path(
        &self,
        store: &dyn TowerStore,
        path: &Path,
    ) -> Result<ImportReport, ImportError> {
        info!("Reading data from CSV {path:?}...");
        let file = File::open(path).map_err(|source| ImportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.run(store, BufReader::new(file)).await
    }

    pub async fn run<R: io::Read>(
        &self,
        store: &dyn TowerStore,
        input: R,
    ) -> Result<ImportReport, ImportError> {
        let staged = self.stage(input)?;
        self.commit(store, staged).await
    }

    /// Decode and filter every row of `input`.
    pub fn stage<R: io::Read>(&self, input: R) -> Result<Staged, ImportError> {
        if !self.filters.is_empty() {
            info!("Filters {}", self.filters);
        }

        let mut staged = Staged::default();
        for decoded in Rows::new(input)? {
            staged.rows += 1;
            // header is line 1
            let line = staged.rows + 1;
            let accepted = decoded?.and_then(|cell| {
                self.filters.check(line, &cell)?;
                Ok(cell)
            });
            match accepted {
                Ok(cell) => staged.towers.push((cell.key, cell.record)),
                Err(e) => {
                    if e.is_filtered() {
                        trace!("{e}");
                    } else {
                        warn!("{e}");
                    }
                    staged.skipped += 1;
                }
            }

            if staged.rows % PROGRESS_INTERVAL == 0 {
                info!(
                    "{} rows read, {} accepted, {} skipped",
                    staged.rows,
                    staged.towers.len(),
                    staged.skipped
                );
            }
        }

        Ok(staged)
    }

    /// Write staged entries to the store.
    pub async fn commit(
        &self,
        store: &dyn TowerStore,
        staged: Staged,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport {
            rows: staged.rows,
            accepted: staged.towers.len() as u64,
            skipped: staged.skipped,
            ..Default::default()
        };

        if staged.towers.is_empty() {
            info!("No record for import, store left untouched");
            report.total = store.count().await?;
            return Ok(report);
        }

        if self.mode == ImportMode::Full {
            info!("Deleting old data...");
            report.deleted = store.purge().await?;
            if report.deleted > 0 {
                info!("Deleted {} records", report.deleted);
            }
        }

        info!("Bulk importing [{} records]...", report.accepted);
        for batch in staged.towers.chunks(self.batch_size) {
            report.outcome += store.upsert_batch(batch).await?;
        }
        if report.outcome.modified > 0 {
            info!("Modified {} records", report.outcome.modified);
        }
        if report.outcome.failed > 0 {
            warn!("{} records refused by the store", report.outcome.failed);
        }

        report.total = store.count().await?;
        info!("Total unique records in DB: {}", report.total);
        Ok(report)
    }
}
