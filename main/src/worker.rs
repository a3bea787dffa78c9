use std::sync::Arc;

use analysis_queue::{spawn_workers, QueueConfig, QueueManager, RemoteAnalysisExecutor};
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let executor = Arc::new(RemoteAnalysisExecutor::from_config(&config)?);
    let manager = Arc::new(QueueManager::new(
        db,
        executor,
        QueueConfig::from_app_config(&config),
    ));

    let worker_count = config.effective_worker_count();
    info!(
        worker_count,
        max_concurrent = config.max_concurrent_jobs,
        "Starting analysis workers"
    );

    for handle in spawn_workers(&manager, worker_count) {
        if let Err(e) = handle.await {
            error!("Worker task ended unexpectedly: {:?}", e);
        }
    }

    Ok(())
}
