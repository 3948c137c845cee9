use std::sync::Arc;

use application::Mailer;
use config::AppConfig;
use thiserror::Error;
use tracing::info;

use crate::{
    mail::{HttpRelayMailer, LogMailer},
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub storage: Arc<PgStorage>,
    pub mailer: Arc<dyn Mailer>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        info!("数据库迁移完成");

        let storage = Arc::new(PgStorage::new(pool));
        let mailer: Arc<dyn Mailer> = match &config.mail.relay_url {
            Some(url) => Arc::new(HttpRelayMailer::new(url.clone(), config.mail.sender.clone())),
            None => Arc::new(LogMailer),
        };

        Ok(Self { storage, mailer })
    }
}
