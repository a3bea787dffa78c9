use std::sync::Arc;

use analysis_queue::{spawn_workers, RemoteAnalysisExecutor};
use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{storage::db::SurrealDbClient, utils::config::get_config};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
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

    // Ensure db is initialized
    db.ensure_initialized().await?;

    let executor = Arc::new(RemoteAnalysisExecutor::from_config(&config)?);
    let api_state = ApiState::with_db(db, executor, &config);

    // API and workers share one manager, so both see the same concurrency cap.
    let worker_count = config.effective_worker_count();
    let workers = spawn_workers(&api_state.manager, worker_count);
    info!(worker_count, "Analysis workers started");

    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    let served = axum::serve(listener, app).await;

    for worker in workers {
        worker.abort();
    }
    if let Err(e) = &served {
        error!("Server stopped: {:?}", e);
    }
    served?;

    Ok(())
}
