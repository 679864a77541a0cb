use sqlx::{PgPool, Postgres};
use tokio::runtime::Handle;

use crate::{ProviderError, SegmentRow, SegmentTable, SegmentTransaction};

/// DDL for the segment table.
pub const CREATE_SEGMENT_TABLE: &str = "CREATE TABLE IF NOT EXISTS t_segment_id_biz (
    biz_key VARCHAR(128) PRIMARY KEY,
    max_id  BIGINT       NOT NULL DEFAULT 0,
    step    INT          NOT NULL DEFAULT 1000
)";

/// A [`SegmentTable`] on PostgreSQL.
///
/// The provider API is blocking, so every query is driven to completion on
/// `runtime`. Do not use it from inside that runtime's async context; call it
/// from plain threads (which is where segment generators and their refill
/// pools run).
#[derive(Debug, Clone)]
pub struct PgSegmentTable {
    pool: PgPool,
    runtime: Handle,
}

impl PgSegmentTable {
    pub const fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    /// Runs [`CREATE_SEGMENT_TABLE`].
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on database failure.
    pub fn create_table(&self) -> Result<(), ProviderError> {
        self.runtime
            .block_on(sqlx::query(CREATE_SEGMENT_TABLE).execute(&self.pool))
            .map(|_| ())
            .map_err(ProviderError::store)
    }

    /// Registers `biz_key` with its starting `max_id` and `step` unless it
    /// already exists. Returns whether a row was inserted.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Store`] on database failure.
    pub fn register_key(&self, biz_key: &str, max_id: i64, step: i32) -> Result<bool, ProviderError> {
        let result = self
            .runtime
            .block_on(
                sqlx::query(
                    "INSERT INTO t_segment_id_biz (biz_key, max_id, step) VALUES ($1, $2, $3) \
                     ON CONFLICT (biz_key) DO NOTHING",
                )
                .bind(biz_key)
                .bind(max_id)
                .bind(step)
                .execute(&self.pool),
            )
            .map_err(ProviderError::store)?;
        Ok(result.rows_affected() == 1)
    }
}

impl SegmentTable for PgSegmentTable {
    type Transaction<'a> = PgTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, ProviderError> {
        let tx = self
            .runtime
            .block_on(self.pool.begin())
            .map_err(ProviderError::store)?;
        Ok(PgTransaction {
            tx,
            runtime: &self.runtime,
        })
    }
}

/// An open transaction on a [`PgSegmentTable`]. Dropped without commit, it
/// rolls back when the connection returns to the pool.
pub struct PgTransaction<'a> {
    tx: sqlx::Transaction<'static, Postgres>,
    runtime: &'a Handle,
}

impl SegmentTransaction for PgTransaction<'_> {
    fn select_for_update(&mut self, biz_key: &str) -> Result<Option<SegmentRow>, ProviderError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query_as::<_, (i64, i32)>(
                    "SELECT max_id, step FROM t_segment_id_biz WHERE biz_key = $1 FOR UPDATE",
                )
                .bind(biz_key)
                .fetch_optional(&mut *self.tx),
            )
            .map_err(ProviderError::store)?;
        Ok(row.map(|(max_id, step)| SegmentRow {
            max_id,
            step: i64::from(step),
        }))
    }

    fn compare_and_set_max_id(
        &mut self,
        biz_key: &str,
        expected: i64,
        new_max: i64,
    ) -> Result<u64, ProviderError> {
        let result = self
            .runtime
            .block_on(
                sqlx::query(
                    "UPDATE t_segment_id_biz SET max_id = $1 WHERE biz_key = $2 AND max_id = $3",
                )
                .bind(new_max)
                .bind(biz_key)
                .bind(expected)
                .execute(&mut *self.tx),
            )
            .map_err(ProviderError::store)?;
        Ok(result.rows_affected())
    }

    fn commit(self) -> Result<(), ProviderError> {
        self.runtime
            .block_on(self.tx.commit())
            .map_err(ProviderError::store)
    }

    fn rollback(self) -> Result<(), ProviderError> {
        self.runtime
            .block_on(self.tx.rollback())
            .map_err(ProviderError::store)
    }
}

impl core::fmt::Debug for PgTransaction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}
