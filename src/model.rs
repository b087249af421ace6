use geo::Point;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Radio technology of a cell tower.
///
/// Datasets use `UMTS` where the geolocation API says `wcdma`, so both parse
/// to [`RadioType::Wcdma`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    AsRefStr,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RadioType {
    #[default]
    Gsm,
    #[serde(alias = "umts")]
    #[strum(to_string = "wcdma", serialize = "umts")]
    Wcdma,
    Lte,
    Cdma,
    Nr,
}

/// Unique key of a tower in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TowerKey {
    pub radio: RadioType,
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u16,
    pub cell: u32,
}

/// Recorded position of a tower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TowerRecord {
    /// `x` is longitude, `y` is latitude, both in degrees.
    pub location: Point,
    /// Radius in meters.
    pub accuracy: f64,
}

impl TowerRecord {
    pub fn new(lon: f64, lat: f64, accuracy: f64) -> Self {
        Self {
            location: Point::new(lon, lat),
            accuracy,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.location.x()
    }

    pub fn latitude(&self) -> f64 {
        self.location.y()
    }

    /// Whether the record can be persisted: finite coordinates within the
    /// WGS84 ranges and a finite, non-negative accuracy.
    pub fn is_valid(&self) -> bool {
        let (lon, lat) = self.location.x_y();
        lon.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lon)
            && (-90.0..=90.0).contains(&lat)
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
    }
}
