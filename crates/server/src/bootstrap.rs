use axum::Router;
use chrono::Utc;
use imprest_core::config::{AppConfig, ConfigError, LoadOptions};
use imprest_db::repositories::{RepositoryError, SessionRepository, SqlSessionRepository};
use imprest_db::{connection::connect_with_config, migrations, DbPool};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;
use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("expired session purge failed: {0}")]
    SessionPurge(#[source] RepositoryError),
}

impl Application {
    pub fn state(&self) -> AppState {
        AppState::sql(self.db_pool.clone())
    }

    /// Health probe plus the JSON API, wrapped in request tracing.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router(self.db_pool.clone()))
            .merge(api::router(self.state()))
            .layer(TraceLayer::new_for_http())
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        advance_id = "none",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        advance_id = "none",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        advance_id = "none",
        "database migrations applied"
    );

    let purged = SqlSessionRepository::new(db_pool.clone())
        .delete_expired(Utc::now())
        .await
        .map_err(BootstrapError::SessionPurge)?;
    info!(
        event_name = "system.bootstrap.sessions_purged",
        correlation_id = "bootstrap",
        advance_id = "none",
        purged,
        "expired sessions removed"
    );

    Ok(Application { config, db_pool })
}
