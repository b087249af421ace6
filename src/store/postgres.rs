use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{BatchOutcome, StoreError, TowerQuery, TowerStore};
use crate::model::{TowerKey, TowerRecord};

// postgres allows 65535 bind parameters per statement, each row takes 8
const ROWS_PER_STATEMENT: usize = 4096;

/// Postgres-backed store. Every call checks a connection out of the pool and
/// returns it when the call ends, whether or not it succeeded.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TowerStore for PgStore {
    async fn find(&self, q: &TowerQuery) -> Result<Vec<TowerRecord>, StoreError> {
        let (areas, cells): (Vec<i32>, Vec<i64>) = q
            .cells
            .iter()
            .map(|&(lac, cell)| (i32::from(lac), i64::from(cell)))
            .unzip();
        let radio: &'static str = q.radio.into();

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<(f64, f64, f64)> = query_as(
            "select lon, lat, range from cell_tower
            where radio = $1 and mcc = $2 and mnc = $3
            and (lac, cell) in (select * from unnest($4::integer[], $5::bigint[]))",
        )
        .bind(radio)
        .bind(i32::from(q.mcc))
        .bind(i32::from(q.mnc))
        .bind(areas)
        .bind(cells)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(lon, lat, range)| TowerRecord::new(lon, lat, range))
            .collect())
    }

    async fn upsert_batch(
        &self,
        batch: &[(TowerKey, TowerRecord)],
    ) -> Result<BatchOutcome, StoreError> {
        let mut outcome = BatchOutcome::default();
        if batch.is_empty() {
            return Ok(outcome);
        }

        let mut conn = self.pool.acquire().await?;
        for chunk in batch.chunks(ROWS_PER_STATEMENT) {
            // a single insert may not touch the same row twice
            let mut unique: HashMap<TowerKey, TowerRecord> = HashMap::with_capacity(chunk.len());
            for (key, record) in chunk {
                if !record.is_valid() {
                    outcome.failed += 1;
                } else if unique.insert(*key, *record).is_some() {
                    outcome.modified += 1;
                }
            }
            if unique.is_empty() {
                continue;
            }

            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "insert into cell_tower (radio, mcc, mnc, lac, cell, lon, lat, range) ",
            );
            builder.push_values(unique, |mut row, (key, record)| {
                let radio: &'static str = key.radio.into();
                row.push_bind(radio)
                    .push_bind(i32::from(key.mcc))
                    .push_bind(i32::from(key.mnc))
                    .push_bind(i32::from(key.lac))
                    .push_bind(i64::from(key.cell))
                    .push_bind(record.longitude())
                    .push_bind(record.latitude())
                    .push_bind(record.accuracy);
            });
            builder.push(
                " on conflict (radio, mcc, mnc, lac, cell) do update
                set lon = excluded.lon, lat = excluded.lat, range = excluded.range
                returning (xmax = 0) as inserted",
            );

            let inserted: Vec<bool> = builder
                .build_query_scalar()
                .fetch_all(&mut *conn)
                .await?;
            for x in inserted {
                if x {
                    outcome.inserted += 1;
                } else {
                    outcome.modified += 1;
                }
            }
            debug!(rows = chunk.len(), "upserted chunk");
        }

        Ok(outcome)
    }

    async fn purge(&self) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = query("delete from cell_tower").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let total: i64 = query_scalar("select count(*) from cell_tower")
            .fetch_one(&mut *conn)
            .await?;
        Ok(total as u64)
    }
}
