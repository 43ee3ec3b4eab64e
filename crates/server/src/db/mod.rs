//! Durable order storage.
//!
//! # Database
//!
//! ## Tables
//!
//! - `orders` - Order header, keyed by order uid
//! - `deliveries` - One row per order
//! - `payments` - One row per order, `transaction` equals the order uid
//! - `items` - Order lines, ordered by `position`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/`, embedded in the
//! binary, and run via:
//! ```bash
//! cargo run -p orderflow-cli -- migrate
//! ```
//! or at server startup with `RUN_MIGRATIONS=true`.

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod orders;

use std::time::Duration;

use async_trait::async_trait;
use orderflow_core::{OrderAggregate, OrderUid};
use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::config::{ConfigError, DatabaseConfig};

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryOrderStore;
pub use orders::PgOrderRepository;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order uid).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Durable storage for order aggregates.
///
/// Implementations must be safe to call concurrently from the ingestion task
/// and from any number of HTTP handlers.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a full aggregate atomically: either every row is written or none.
    async fn create_order(&self, order: &OrderAggregate) -> Result<(), RepositoryError>;

    /// Load a full aggregate.
    ///
    /// Returns `RepositoryError::NotFound` when no order has this uid.
    async fn get_order(&self, id: OrderUid) -> Result<OrderAggregate, RepositoryError>;
}

/// Errors raised while opening the database.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `PoolError` if the settings are invalid or the connection cannot
/// be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, PoolError> {
    let options = config.connect_options()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Apply embedded migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history is inconsistent.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
