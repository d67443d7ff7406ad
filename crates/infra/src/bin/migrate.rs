use anyhow::Context;

use orderlink_infra::config::{StoreBackend, StoreConfig};
use orderlink_infra::store::PostgresEntityStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    orderlink_observability::init();

    let config = StoreConfig::from_env().context("failed to load store configuration")?;

    match config.backend {
        StoreBackend::InMemory => {
            tracing::warn!("USE_PERSISTENT_STORES is not set; nothing to migrate");
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresEntityStore::connect(&database_url, max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store.migrate().await.context("db migrate failed")?;
            tracing::info!("orderlink schema is up to date");
        }
    }

    Ok(())
}
