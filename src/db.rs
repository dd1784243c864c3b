use crate::store::{StoreError, StoreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection, SqlitePool};
use std::{env, str::FromStr};
use tracing::{info, warn};

/// Where the counter is stored when `DATABASE_URL` is not set, next to the
/// working directory like the original deployment.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://database.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.into(),
            max_connections: 1,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        // pool may be opened before the App exists, so load .env here as well
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let url = env::var("DATABASE_URL").unwrap_or(defaults.url);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);
        Self {
            url,
            max_connections,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        }
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Sqlite pool configured from the environment.
pub async fn sqlite() -> StoreResult<SqlitePool> {
    crate::app::logger();
    sqlite_with(&DatabaseConfig::from_env()).await
}

pub async fn sqlite_with(config: &DatabaseConfig) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(StoreError::StorageUnavailable)?
        .create_if_missing(true);
    let pool = if config.is_memory() {
        memory_pool(config, options).await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(StoreError::StorageUnavailable)?
    };
    info!("Connected to SQLite database at {}", config.url);
    Ok(pool)
}

/// An in-memory database lives only while some connection to it is open, so
/// one connection outside the pool is held until the pool closes.
async fn memory_pool(
    config: &DatabaseConfig,
    options: SqliteConnectOptions,
) -> StoreResult<SqlitePool> {
    if config.max_connections > 1 {
        // shared-cache connections fail on table locks instead of waiting for the busy timeout
        warn!("In-memory database only supports one connection, ignoring DATABASE_MAX_CONNECTIONS");
    }
    let keeper = options
        .connect()
        .await
        .map_err(StoreError::StorageUnavailable)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(StoreError::StorageUnavailable)?;
    let closed = pool.close_event();
    tokio::spawn(async move {
        closed.await;
        keeper.close().await.ok();
    });
    Ok(pool)
}
