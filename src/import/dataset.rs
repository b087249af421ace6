//! Row decoding for OpenCellID / Mozilla Location Service CSV exports.
//!
//! Columns are read by position:
//! `radio,mcc,net,area,cell,unit,lon,lat,range,samples,...`. The first line
//! is a header and only tells how many columns every row has.

use std::{io, str::FromStr};

use csv::StringRecord;
use thiserror::Error;

use super::ImportError;
use crate::model::{RadioType, TowerKey, TowerRecord};

const RADIO: usize = 0;
const MCC: usize = 1;
const MNC: usize = 2;
const AREA: usize = 3;
const CELL: usize = 4;
const LON: usize = 6;
const LAT: usize = 7;
const RANGE: usize = 8;
const SAMPLES: usize = 9;

pub const MIN_COLUMNS: usize = SAMPLES + 1;

/// A decoded data row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRow {
    pub key: TowerKey,
    pub record: TowerRecord,
    pub samples: u32,
}

/// Why a single row was left out. Never fatal to an import.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("[{row}] bad {field}: {value:?}")]
    Field {
        row: u64,
        field: &'static str,
        value: String,
    },
    #[error("[{row}] malformed row: {source}")]
    Malformed {
        row: u64,
        #[source]
        source: csv::Error,
    },
    #[error("[{row}] rejected by {filter} filter")]
    Filtered { row: u64, filter: &'static str },
}

impl RowError {
    /// Filtered rows are expected; everything else is worth a diagnostic.
    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::Filtered { .. })
    }
}

pub type Decoded = Result<CellRow, RowError>;

/// Lazy sequence of decoded rows. Ends after the last row or after the first
/// read failure, which is yielded as an error.
pub struct Rows<R> {
    reader: csv::Reader<R>,
    record: StringRecord,
    // line of the last record read, the header being line 1
    line: u64,
    done: bool,
}

impl<R: io::Read> Rows<R> {
    /// Read the header and prepare to decode rows.
    pub fn new(input: R) -> Result<Self, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input);
        let columns = reader.headers().map_err(ImportError::Read)?.len();
        if columns < MIN_COLUMNS {
            return Err(ImportError::Header { columns });
        }

        Ok(Self {
            reader,
            record: StringRecord::new(),
            line: 1,
            done: false,
        })
    }
}

impl<R: io::Read> Iterator for Rows<R> {
    type Item = Result<Decoded, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let read = self.reader.read_record(&mut self.record);
        self.line += 1;
        match read {
            Ok(true) => Some(Ok(decode(self.line, &self.record))),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) if e.is_io_error() => {
                self.done = true;
                Some(Err(ImportError::Read(e)))
            }
            Err(source) => Some(Ok(Err(RowError::Malformed {
                row: self.line,
                source,
            }))),
        }
    }
}

fn decode(row: u64, record: &StringRecord) -> Decoded {
    let key = TowerKey {
        radio: parse(row, record, RADIO, "radio")?,
        mcc: parse(row, record, MCC, "MCC")?,
        mnc: parse(row, record, MNC, "MNC")?,
        lac: parse(row, record, AREA, "area")?,
        cell: parse(row, record, CELL, "cell")?,
    };

    let lon: f64 = parse(row, record, LON, "longitude")?;
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(bad(row, record, LON, "longitude"));
    }
    let lat: f64 = parse(row, record, LAT, "latitude")?;
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(bad(row, record, LAT, "latitude"));
    }
    let range: f64 = parse(row, record, RANGE, "range")?;
    if !range.is_finite() || range < 0.0 {
        return Err(bad(row, record, RANGE, "range"));
    }

    Ok(CellRow {
        key,
        record: TowerRecord::new(lon, lat, range),
        samples: parse(row, record, SAMPLES, "samples")?,
    })
}

fn parse<T: FromStr>(
    row: u64,
    record: &StringRecord,
    index: usize,
    field: &'static str,
) -> Result<T, RowError> {
    record
        .get(index)
        .and_then(|x| x.trim().parse().ok())
        .ok_or_else(|| bad(row, record, index, field))
}

fn bad(row: u64, record: &StringRecord, index: usize, field: &'static str) -> RowError {
    RowError::Field {
        row,
        field,
        value: record.get(index).unwrap_or_default().to_owned(),
    }
}
