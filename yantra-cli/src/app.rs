use std::net::SocketAddr;

use tracing::info;

use yantra_core::broker::Broker;
use yantra_core::compiler::CompilerService;
use yantra_core::config::Config;
use yantra_core::sandbox::SandboxExecutor;
use yantra_core::staging::FileStager;
use yantra_core::store::Store;
use yantra_core::submission::SubmissionService;
use yantra_core::template::TemplateService;
use yantra_core::worker::Worker;
use yantra_core::{ErrContext, Result};

use crate::api;

async fn connect_store(config: &Config) -> Result<Store> {
    Store::connect(
        &config.database_url,
        config.db_min_connections,
        config.db_max_connections,
    )
    .await
}

/// Migrates the store, seeds the catalog and runs the HTTP adapter.
pub async fn serve(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    store.migrate().await?;

    let broker = Broker::connect(&config.redis_url, &config.job_queue, &config.build_queue).await?;

    let templates = TemplateService::new(store.clone());
    templates.seed().await?;

    let state = api::AppState {
        submissions: SubmissionService::new(
            store.clone(),
            broker.clone(),
            FileStager::new(&config),
        ),
        compilers: CompilerService::new(store.clone(), broker.clone()),
        templates,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind api address")?;
    info!(%addr, "api listening");

    axum::serve(listener, api::router(state))
        .await
        .context("api server failed")?;
    Ok(())
}

/// Runs the queue-draining worker loop until the process is stopped.
pub async fn worker(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    store.migrate().await?;

    let broker = Broker::connect(&config.redis_url, &config.job_queue, &config.build_queue).await?;
    let executor = SandboxExecutor::new(
        &config.container_runtime_bin,
        &config.container_mount_path,
        config.build_timeout_secs,
    );

    Worker::new(store, broker, executor, config).run().await
}

/// One-shot catalog seeding, for use outside of `serve`.
pub async fn seed(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    store.migrate().await?;

    let summary = TemplateService::new(store).seed().await?;
    info!(
        added = ?summary.added,
        skipped = ?summary.skipped,
        errors = ?summary.errors,
        "seeding finished"
    );
    Ok(())
}
