//! `raclette` server binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use raclette_cache::{init_logging, AppState, BlobRepository, CacheServer, StoreRepository};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = cli.resolve_config().context("invalid configuration")?;
    init_logging(&config.log)?;

    let repository = Arc::new(
        StoreRepository::open(&config.store)
            .with_context(|| format!("cannot open store at {}", config.store.database.path.display()))?,
    );
    tracing::info!(
        path = %config.store.database.path.display(),
        overwrite_existing = repository.overwrite_existing(),
        entries = repository.len(),
        "store ready"
    );

    let shared: Arc<dyn BlobRepository> = repository.clone();
    let state = AppState::new(shared, config.store.max_payload_bytes);
    let server = CacheServer::new(config.server.clone(), state);
    server.serve(shutdown_signal()).await?;

    match Arc::try_unwrap(repository) {
        Ok(repository) => repository.close()?,
        Err(_) => tracing::warn!("repository still in use after shutdown, skipping checkpoint"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
