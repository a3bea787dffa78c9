use std::sync::Arc;

use analysis_queue::{AnalysisExecutor, QueueConfig, QueueManager};
use common::{storage::db::SurrealDbClient, utils::config::AppConfig};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub manager: Arc<QueueManager>,
    pub config: AppConfig,
}

impl ApiState {
    pub async fn new(
        config: &AppConfig,
        executor: Arc<dyn AnalysisExecutor>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let surreal_db_client = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        surreal_db_client.ensure_initialized().await?;

        Ok(Self::with_db(surreal_db_client, executor, config))
    }

    /// Builds the state around an already connected store.
    pub fn with_db(
        db: Arc<SurrealDbClient>,
        executor: Arc<dyn AnalysisExecutor>,
        config: &AppConfig,
    ) -> Self {
        let manager = Arc::new(QueueManager::new(
            Arc::clone(&db),
            executor,
            QueueConfig::from_app_config(config),
        ));

        Self {
            db,
            manager,
            config: config.clone(),
        }
    }
}
