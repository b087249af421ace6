//! Cell tower geolocation backed by a locally imported tower database.
//!
//! [`geolocate::Locator`] answers geolocation requests from the towers kept in
//! a [`store::TowerStore`], and [`import::Importer`] fills that store from
//! OpenCellID or Mozilla Location Service CSV exports.

pub mod config;
pub mod distance;
pub mod geolocate;
pub mod import;
pub mod model;
pub mod store;

pub use geolocate::{LocateError, LocationRequest, LocationResponse, Locator};
pub use import::{ImportError, ImportMode, ImportReport, Importer};
pub use model::{RadioType, TowerKey, TowerRecord};
pub use store::{MemoryStore, PgStore, StoreError, TowerStore};
