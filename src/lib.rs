//! Durable single-value counter served over http.
//!
//! [`CounterStore`](store::CounterStore) owns the persisted integer, the
//! [`api`] routes expose `GET /counter` and `POST /increment`, and [`App`]
//! wraps them with logging, metrics, CORS and error reporting.

pub mod api;
pub mod app;
pub mod db;
pub mod errors;
mod metrics;
pub mod store;

pub mod prelude {
    pub use crate::api::{router as counter_router, CounterBody};
    pub use crate::app::{App, ServerConfig};
    pub use crate::db::{sqlite, sqlite_with, DatabaseConfig};
    pub use crate::errors::{AppError, AppResult, ErrorBody, DATABASE_ERROR};
    pub use crate::store::{CounterStore, StoreError, StoreResult, COUNTER_ID};
    pub use axum::response::IntoResponse;
    pub use axum::routing::{get, post};
    pub use axum::{Extension, Json, Router};
    pub use serde::{Deserialize, Serialize};
    pub use sqlx::SqlitePool;
    pub use tracing::{debug, error, info, trace, warn};
}
