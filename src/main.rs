use anyhow::Context;
use counter_web::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::new();
    let db = sqlite().await.context("opening database")?;
    let store = CounterStore::initialize(db)
        .await
        .context("initializing counter store")?;
    app.serve_counter(store).await
}
