//! Position estimates from observed cell towers.
//!
//! Every tower in a request that is known to the store contributes its
//! recorded point. The estimate is the mean of those points, and the accuracy
//! is the radius of the smallest circle around the mean that still covers
//! each contributing tower's own accuracy disk.

use std::sync::Arc;

use geo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    distance::haversine,
    model::{RadioType, TowerRecord},
    store::{StoreError, TowerQuery, TowerStore},
};

mod http;

pub use http::service;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("request contains no cell towers")]
    EmptyRequest,
    #[error("none of the requested cell towers are known")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    #[serde(default)]
    pub radio_type: Option<RadioType>,
    #[serde(default)]
    pub home_mobile_country_code: Option<u16>,
    #[serde(default)]
    pub home_mobile_network_code: Option<u16>,
    #[serde(default)]
    pub cell_towers: Vec<CellTower>,
}

/// An observed tower. Only the codes and cell id take part in the lookup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellTower {
    #[serde(default)]
    pub radio_type: Option<RadioType>,
    #[serde(default)]
    pub mobile_country_code: u16,
    #[serde(default)]
    pub mobile_network_code: u16,
    pub location_area_code: u16,
    pub cell_id: u32,
    #[serde(default)]
    pub signal_strength: Option<i32>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub timing_advance: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LocationResponse {
    pub location: Location,
    /// Meters.
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Resolves requests against a [`TowerStore`]. Holds no state besides the
/// store handle, so one instance can serve any number of concurrent callers.
#[derive(Clone)]
pub struct Locator {
    store: Arc<dyn TowerStore>,
    default_radio: RadioType,
}

impl Locator {
    /// `default_radio` is used for requests that do not name a radio type.
    pub fn new(store: Arc<dyn TowerStore>, default_radio: RadioType) -> Self {
        Self {
            store,
            default_radio,
        }
    }

    /// Build the store lookup for a request.
    ///
    /// Request-level radio, country and network win. Otherwise the radio falls
    /// back to the configured default and the codes to the first tower's.
    pub fn query(&self, req: &LocationRequest) -> Result<TowerQuery, LocateError> {
        let first = req.cell_towers.first().ok_or(LocateError::EmptyRequest)?;

        let radio = req.radio_type.unwrap_or(self.default_radio);
        let mcc = req
            .home_mobile_country_code
            .filter(|&x| x != 0)
            .unwrap_or(first.mobile_country_code);
        let mnc = req
            .home_mobile_network_code
            .filter(|&x| x != 0)
            .unwrap_or(first.mobile_network_code);
        let cells = req
            .cell_towers
            .iter()
            .map(|x| (x.location_area_code, x.cell_id))
            .collect();

        Ok(TowerQuery {
            radio,
            mcc,
            mnc,
            cells,
        })
    }

    /// Stored records of the requested towers that are known.
    pub async fn find_towers(
        &self,
        req: &LocationRequest,
    ) -> Result<Vec<TowerRecord>, LocateError> {
        let query = self.query(req)?;
        let towers = self.store.find(&query).await?;
        debug!(
            requested = query.cells.len(),
            found = towers.len(),
            "looked up towers"
        );
        Ok(towers)
    }

    pub async fn locate(&self, req: &LocationRequest) -> Result<LocationResponse, LocateError> {
        let towers = self.find_towers(req).await?;
        estimate(&towers).ok_or(LocateError::NotFound)
    }
}

/// Mean position of `towers` and the radius around it covering every
/// tower's accuracy disk. `None` when there are no towers.
pub fn estimate(towers: &[TowerRecord]) -> Option<LocationResponse> {
    if towers.is_empty() {
        return None;
    }

    let count = towers.len() as f64;
    let (lon, lat) = towers.iter().fold((0.0, 0.0), |(lon, lat), x| {
        (lon + x.longitude(), lat + x.latitude())
    });
    let center = Point::new(lon / count, lat / count);

    let accuracy = towers
        .iter()
        .map(|x| haversine(x.location, center) + x.accuracy)
        .fold(0.0, f64::max);

    Some(LocationResponse {
        location: Location {
            lat: center.y(),
            lng: center.x(),
        },
        accuracy,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::{
        model::TowerKey,
        store::{BatchOutcome, MemoryStore},
    };

    fn tower(lac: u16, cell_id: u32) -> CellTower {
        CellTower {
            mobile_country_code: 250,
            mobile_network_code: 2,
            location_area_code: lac,
            cell_id,
            ..Default::default()
        }
    }

    fn key(radio: RadioType, lac: u16, cell: u32) -> TowerKey {
        TowerKey {
            radio,
            mcc: 250,
            mnc: 2,
            lac,
            cell,
        }
    }

    fn moscow() -> Locator {
        let store = MemoryStore::with_towers([
            (
                key(RadioType::Gsm, 7743, 22517),
                TowerRecord::new(37.60, 55.70, 50.0),
            ),
            (
                key(RadioType::Gsm, 7743, 39696),
                TowerRecord::new(37.62, 55.71, 300.0),
            ),
            (
                key(RadioType::Gsm, 7743, 22518),
                TowerRecord::new(37.58, 55.69, 120.0),
            ),
            (
                key(RadioType::Lte, 7743, 22517),
                TowerRecord::new(10.0, 10.0, 10.0),
            ),
        ]);
        Locator::new(Arc::new(store), RadioType::Gsm)
    }

    /// Store that counts lookups and fails every call.
    #[derive(Default)]
    struct BrokenStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TowerStore for BrokenStore {
        async fn find(&self, _: &TowerQuery) -> Result<Vec<TowerRecord>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn upsert_batch(
            &self,
            _: &[(TowerKey, TowerRecord)],
        ) -> Result<BatchOutcome, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn purge(&self) -> Result<u64, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn count(&self) -> Result<u64, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn empty_request_never_touches_store() {
        let store = Arc::new(BrokenStore::default());
        let locator = Locator::new(store.clone(), RadioType::Gsm);
        let req = LocationRequest::default();

        assert!(matches!(
            locator.find_towers(&req).await,
            Err(LocateError::EmptyRequest)
        ));
        assert!(matches!(
            locator.locate(&req).await,
            Err(LocateError::EmptyRequest)
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let store = Arc::new(BrokenStore::default());
        let locator = Locator::new(store.clone(), RadioType::Gsm);
        let req = LocationRequest {
            cell_towers: vec![tower(7743, 22517)],
            ..Default::default()
        };

        assert!(matches!(
            locator.locate(&req).await,
            Err(LocateError::Store(_))
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn query_uses_request_level_codes() {
        let locator = moscow();
        let req = LocationRequest {
            radio_type: Some(RadioType::Lte),
            home_mobile_country_code: Some(255),
            home_mobile_network_code: Some(1),
            cell_towers: vec![tower(1, 2), tower(3, 4)],
        };
        let query = locator.query(&req).unwrap();
        assert_eq!(
            query,
            TowerQuery {
                radio: RadioType::Lte,
                mcc: 255,
                mnc: 1,
                cells: vec![(1, 2), (3, 4)],
            }
        );
    }

    #[test]
    fn query_falls_back_to_first_tower_and_default_radio() {
        let locator = Locator::new(Arc::new(MemoryStore::new()), RadioType::Wcdma);
        let mut second = tower(3, 4);
        second.mobile_country_code = 257;
        let req = LocationRequest {
            home_mobile_country_code: Some(0),
            cell_towers: vec![tower(1, 2), second],
            ..Default::default()
        };
        let query = locator.query(&req).unwrap();
        assert_eq!(query.radio, RadioType::Wcdma);
        assert_eq!((query.mcc, query.mnc), (250, 2));
    }

    #[tokio::test]
    async fn finds_only_matching_radio() {
        let locator = moscow();
        let req = LocationRequest {
            cell_towers: vec![tower(7743, 22517), tower(7743, 1)],
            ..Default::default()
        };
        let towers = locator.find_towers(&req).await.unwrap();
        assert_eq!(towers, vec![TowerRecord::new(37.60, 55.70, 50.0)]);
    }

    #[tokio::test]
    async fn single_match_is_exact() {
        let locator = moscow();
        let req = LocationRequest {
            cell_towers: vec![tower(7743, 22517)],
            ..Default::default()
        };
        let resp = locator.locate(&req).await.unwrap();
        assert_eq!(
            resp.location,
            Location {
                lat: 55.70,
                lng: 37.60
            }
        );
        assert_eq!(resp.accuracy, 50.0);
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let locator = moscow();
        let req = LocationRequest {
            cell_towers: vec![tower(1, 1)],
            ..Default::default()
        };
        assert!(matches!(
            locator.locate(&req).await,
            Err(LocateError::NotFound)
        ));
    }

    #[tokio::test]
    async fn tower_order_does_not_matter() {
        let locator = moscow();
        let forward = LocationRequest {
            cell_towers: vec![
                tower(7743, 22517),
                tower(7743, 39696),
                tower(7743, 22518),
            ],
            ..Default::default()
        };
        let mut backward = forward.clone();
        backward.cell_towers.reverse();

        let a = locator.locate(&forward).await.unwrap();
        let b = locator.locate(&backward).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn estimate_of_nothing() {
        assert_eq!(estimate(&[]), None);
    }

    #[test]
    fn estimate_is_mean() {
        let resp = estimate(&[
            TowerRecord::new(10.0, 20.0, 0.0),
            TowerRecord::new(12.0, 22.0, 0.0),
        ])
        .unwrap();
        assert!((resp.location.lng - 11.0).abs() < 1e-12);
        assert!((resp.location.lat - 21.0).abs() < 1e-12);
    }

    #[test]
    fn accuracy_covers_farthest_disk() {
        let towers = [
            TowerRecord::new(0.0, 0.0, 10.0),
            TowerRecord::new(0.0, 0.02, 500.0),
        ];
        let resp = estimate(&towers).unwrap();
        let center = Point::new(resp.location.lng, resp.location.lat);
        let expected = haversine(towers[1].location, center) + 500.0;
        assert!((resp.accuracy - expected).abs() < 1e-6);
    }

    #[rstest]
    #[case(&[(37.60, 55.70, 50.0), (37.62, 55.71, 300.0)])]
    #[case(&[(0.0, 0.0, 0.0), (0.0, 0.0, 0.0), (1.0, 1.0, 5.0)])]
    #[case(&[(-179.9, 10.0, 20.0), (179.9, 10.0, 2000.0), (0.0, -89.0, 1.0)])]
    fn accuracy_not_below_any_tower(#[case] towers: &[(f64, f64, f64)]) {
        let towers: Vec<_> = towers
            .iter()
            .map(|&(lon, lat, r)| TowerRecord::new(lon, lat, r))
            .collect();
        let resp = estimate(&towers).unwrap();
        for x in &towers {
            assert!(resp.accuracy >= x.accuracy);
        }
    }

    #[test]
    fn request_json() {
        let req: LocationRequest = serde_json::from_str(
            r#"{
                "radioType": "gsm",
                "cellTowers": [
                    {"mobileCountryCode": 250, "mobileNetworkCode": 2,
                     "locationAreaCode": 7743, "cellId": 22517, "signalStrength": -78}
                ],
                "considerIp": false
            }"#,
        )
        .unwrap();
        assert_eq!(req.radio_type, Some(RadioType::Gsm));
        assert_eq!(req.cell_towers[0].cell_id, 22517);
        assert_eq!(req.cell_towers[0].signal_strength, Some(-78));
    }
}
