use std::{collections::HashSet, fmt};

use super::dataset::{CellRow, RowError};
use crate::model::RadioType;

/// Row filters applied during an import. An empty set admits everything.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub radios: HashSet<RadioType>,
    pub countries: HashSet<u16>,
    pub min_samples: u32,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.radios.is_empty() && self.countries.is_empty() && self.min_samples == 0
    }

    pub fn check(&self, row: u64, cell: &CellRow) -> Result<(), RowError> {
        if !self.radios.is_empty() && !self.radios.contains(&cell.key.radio) {
            return Err(RowError::Filtered {
                row,
                filter: "radio",
            });
        }
        if cell.samples < self.min_samples {
            return Err(RowError::Filtered {
                row,
                filter: "samples",
            });
        }
        if !self.countries.is_empty() && !self.countries.contains(&cell.key.mcc) {
            return Err(RowError::Filtered {
                row,
                filter: "country",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut radios: Vec<&str> = self.radios.iter().map(|x| x.as_ref()).collect();
        radios.sort_unstable();
        let mut countries: Vec<_> = self.countries.iter().collect();
        countries.sort_unstable();

        write!(f, "radio [{}], country [", radios.join(", "))?;
        for (i, x) in countries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{x}")?;
        }
        write!(f, "], min samples {}", self.min_samples)
    }
}
