use crate::errors::AppResult;
use crate::metrics;
use crate::store::CounterStore;
use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

/// Body of both counter endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterBody {
    pub counter: i64,
}

/// Routes for the counter. Needs a [`CounterStore`] injected after it.
pub fn router() -> Router {
    Router::new()
        .route("/counter", get(get_counter))
        .route("/increment", post(increment))
}

async fn get_counter(Extension(store): Extension<CounterStore>) -> AppResult<Json<CounterBody>> {
    let counter = store.get().await?;
    metrics::value_read(counter);
    Ok(Json(CounterBody { counter }))
}

async fn increment(Extension(store): Extension<CounterStore>) -> AppResult<Json<CounterBody>> {
    let counter = store.increment().await?;
    metrics::increment(counter);
    Ok(Json(CounterBody { counter }))
}
