//! Store, fetcher, engine and registry feed wiring.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::runtime::Handle;

use permsync_events::{InMemoryEventBus, InstanceEvent};
use permsync_infra::store::{CatalogStore, InMemoryCatalog, PostgresCatalog};
use permsync_infra::workers::{SyncWorker, WorkerHandle};
use permsync_infra::{DocumentFetcher, HttpDocumentFetcher, SyncConfig, SyncEngine};

pub type RegistryBus = InMemoryEventBus<InstanceEvent>;

/// Everything the handlers need, shared through an `Extension`.
pub struct AppServices {
    pub engine: Arc<SyncEngine>,
    pub bus: Arc<RegistryBus>,
}

impl AppServices {
    pub fn new(store: Arc<dyn CatalogStore>, fetcher: Arc<dyn DocumentFetcher>, config: SyncConfig) -> Self {
        Self {
            engine: Arc::new(SyncEngine::new(store, fetcher, config)),
            bus: Arc::new(RegistryBus::new()),
        }
    }

    /// Start consuming registry announcements published on `bus`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_worker(&self) -> std::io::Result<WorkerHandle> {
        SyncWorker::spawn(
            "registry-feed",
            self.bus.clone(),
            self.engine.clone(),
            Handle::current(),
            None,
        )
    }
}

/// Build services from the environment.
///
/// `DATABASE_URL` selects the Postgres catalog (schema applied on start);
/// without it an in-memory catalog seeded with the predefined roles is used.
pub async fn build_services(config: SyncConfig) -> anyhow::Result<AppServices> {
    let fetcher = HttpDocumentFetcher::new(config.api_docs_path.clone(), config.fetch_timeout)
        .context("failed to build http client")?;

    let store: Arc<dyn CatalogStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPool::connect(&database_url)
                .await
                .context("failed to connect to Postgres")?;
            let catalog = PostgresCatalog::new(pool);
            catalog
                .migrate()
                .await
                .context("failed to apply catalog schema")?;
            tracing::info!("using postgres permission catalog");
            Arc::new(catalog)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory permission catalog");
            Arc::new(InMemoryCatalog::with_predefined_roles(&config.predefined_roles))
        }
    };

    Ok(AppServices::new(store, Arc::new(fetcher), config))
}
