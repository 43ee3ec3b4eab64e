//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! orderflow-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`, or `PGHOST` / `PGPORT` / `PGUSER` / `PGPASSWORD` /
//!   `PGDATABASE` / `PGSSLMODE`
//!
//! Migrations live in `crates/server/migrations/` and are embedded in the
//! server crate.

use orderflow_server::config::{ConfigError, DatabaseConfig};
use orderflow_server::db::{MIGRATOR, PoolError, create_pool, run_migrations};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply every embedded migration that has not run yet.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration
/// fails.
pub async fn run() -> Result<(), MigrationError> {
    let config = DatabaseConfig::from_env()?;

    info!("Connecting to database...");
    let pool = create_pool(&config).await?;

    info!(available = MIGRATOR.iter().count(), "Running migrations...");
    run_migrations(&pool).await?;
    pool.close().await;

    info!("Migrations complete!");
    Ok(())
}
