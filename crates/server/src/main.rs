use std::sync::Arc;

use anyhow::Context;

use permsync_infra::SyncConfig;
use permsync_server::app::{self, services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    permsync_observability::init();

    let config = SyncConfig::from_env();
    let services = Arc::new(services::build_services(config).await?);
    let worker = services
        .spawn_worker()
        .context("failed to spawn registry feed worker")?;

    let bind = std::env::var("PERMSYNC_BIND").unwrap_or_else(|_| {
        tracing::warn!("PERMSYNC_BIND not set; using 0.0.0.0:8080");
        "0.0.0.0:8080".to_string()
    });
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tokio::task::spawn_blocking(move || worker.shutdown()).await?;
    Ok(())
}
