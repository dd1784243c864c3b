//! Durable storage for the single counter.
//!
//! The counter lives in the `counters` table under [`COUNTER_ID`]. Writes go
//! through one async mutex owned by the store, so concurrent increments are
//! strictly ordered regardless of how the pool hands out connections.

use crate::db::{self, DatabaseConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fixed identifier of "the" counter record.
pub const COUNTER_ID: i64 = 1;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),

    #[error("counter {0} not found")]
    NotFound(i64),

    #[error("storage read failed: {0}")]
    StorageRead(#[source] sqlx::Error),

    #[error("storage write failed: {0}")]
    StorageWrite(#[source] sqlx::Error),
}

impl StoreError {
    fn read(error: sqlx::Error) -> Self {
        if medium_lost(&error) {
            return Self::StorageUnavailable(error);
        }
        Self::StorageRead(error)
    }

    fn write(error: sqlx::Error) -> Self {
        if medium_lost(&error) {
            return Self::StorageUnavailable(error);
        }
        Self::StorageWrite(error)
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "unavailable",
            Self::NotFound(_) => "not_found",
            Self::StorageRead(_) => "read",
            Self::StorageWrite(_) => "write",
        }
    }
}

fn medium_lost(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::PoolClosed | sqlx::Error::Io(_))
}

/// Handle to the persisted counter. Cheap to clone, every clone shares the
/// same pool and write lock.
#[derive(Clone, Debug)]
pub struct CounterStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl CounterStore {
    /// Opens the pool described by `config` and initializes the store on it.
    pub async fn open(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = db::sqlite_with(config).await?;
        Self::initialize(pool).await
    }

    /// Creates the schema if needed and inserts the counter with value 0 when
    /// it does not exist yet. An existing value is left untouched.
    pub async fn initialize(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.setup().await?;
        info!(id = COUNTER_ID, "counter store ready");
        Ok(store)
    }

    async fn setup(&self) -> StoreResult<()> {
        let create = r#"
create table if not exists counters (
    id integer primary key,
    value integer not null default 0
        check (typeof(value) = 'integer' and value >= 0)
)
"#;
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::StorageUnavailable)?;
        sqlx::query(create)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::StorageUnavailable)?;
        sqlx::query("insert into counters (id, value) values (?, 0) on conflict(id) do nothing")
            .bind(COUNTER_ID)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::StorageUnavailable)?;
        tx.commit().await.map_err(StoreError::StorageUnavailable)?;
        Ok(())
    }

    pub async fn get(&self) -> StoreResult<i64> {
        sqlx::query_scalar("select value from counters where id = ?")
            .bind(COUNTER_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::read)?
            .ok_or(StoreError::NotFound(COUNTER_ID))
    }

    /// Adds one to the counter and returns the new value.
    ///
    /// On any failure the transaction is rolled back and the stored value is
    /// the one from before the call.
    pub async fn increment(&self) -> StoreResult<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::write)?;
        let value: Option<i64> =
            sqlx::query_scalar("update counters set value = value + 1 where id = ? returning value")
                .bind(COUNTER_ID)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::write)?;
        let Some(value) = value else {
            return Err(StoreError::NotFound(COUNTER_ID));
        };
        tx.commit().await.map_err(StoreError::write)?;
        debug!(value, "counter incremented");
        Ok(value)
    }

    /// Closes the underlying pool. Later calls fail with
    /// [`StoreError::StorageUnavailable`].
    pub async fn close(&self) {
        self.pool.close().await;
        info!("counter store closed");
    }
}
