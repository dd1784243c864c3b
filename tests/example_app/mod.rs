use counter_web::prelude::*;

/// Counter app over a private in-memory database. The pool is returned so
/// tests can tamper with the storage behind the store's back.
pub async fn app() -> anyhow::Result<(App, SqlitePool)> {
    let db = sqlite_with(&DatabaseConfig::in_memory()).await?;
    let store = CounterStore::initialize(db.clone()).await?;
    let app = App::new().router(counter_router()).inject(store);
    Ok((app, db))
}
