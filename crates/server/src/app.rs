//! Composition root.
//!
//! [`App`] wires the store, cache, broker source and HTTP router together and
//! owns the process lifecycle. Shutdown runs in a fixed order: the shared
//! cancellation token fires, the HTTP server drains, the ingestion task is
//! awaited, the broker source is closed, and the database pool is closed.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn;
use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::broker::MessageSource;
use crate::db::PoolError;
use crate::ingest::{IngestError, IngestStats, IngestionLoop};
use crate::middleware::request_id_middleware;
use crate::routes;
use crate::service::OrderService;
use crate::state::AppState;

/// Errors that stop the application.
#[derive(Debug, Error)]
pub enum AppRunError {
    #[error("failed to open database: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to run migrations: {0}")]
    Migrate(#[from] MigrateError),

    #[cfg(feature = "kafka")]
    #[error("failed to create kafka consumer: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("HTTP server error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("ingestion task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Build the HTTP router with the full middleware stack.
pub fn router(state: AppState) -> Router {
    routes::routes()
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// A fully wired, not yet running application.
pub struct App {
    listener: TcpListener,
    orders: OrderService,
    source: Arc<dyn MessageSource>,
    pool: Option<PgPool>,
    shutdown: CancellationToken,
}

impl App {
    /// Build the production application from configuration.
    ///
    /// Opens the database pool, optionally applies migrations, subscribes to
    /// the orders topic and binds the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns `AppRunError` if any dependency cannot be set up.
    #[cfg(feature = "kafka")]
    pub async fn build(config: &crate::config::ServerConfig) -> Result<Self, AppRunError> {
        use crate::broker::KafkaSource;
        use crate::cache::MokaOrderCache;
        use crate::db::{PgOrderRepository, create_pool, run_migrations};

        let pool = create_pool(&config.database).await?;
        tracing::info!("Database pool created");

        if config.run_migrations {
            run_migrations(&pool).await?;
            tracing::info!("Migrations applied");
        }

        let source = KafkaSource::new(&config.kafka)?;

        let listener = TcpListener::bind(config.socket_addr()).await?;
        let orders = OrderService::new(
            Arc::new(PgOrderRepository::new(pool.clone())),
            Arc::new(MokaOrderCache::new(config.cache.capacity)),
            config.cache.refill,
        );

        Ok(Self::from_parts(listener, orders, Arc::new(source), Some(pool)))
    }

    /// Assemble an application from already constructed parts.
    ///
    /// `pool`, when given, backs the readiness check and is closed on
    /// shutdown.
    #[must_use]
    pub fn from_parts(
        listener: TcpListener,
        orders: OrderService,
        source: Arc<dyn MessageSource>,
        pool: Option<PgPool>,
    ) -> Self {
        Self {
            listener,
            orders,
            source,
            pool,
            shutdown: CancellationToken::new(),
        }
    }

    /// Address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the application when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The order service shared by ingestion and HTTP.
    #[must_use]
    pub const fn orders(&self) -> &OrderService {
        &self.orders
    }

    /// Run ingestion and the HTTP server until `signal` resolves or
    /// ingestion fails.
    ///
    /// # Errors
    ///
    /// Returns `AppRunError::Ingest` if the ingestion loop hit a fatal error,
    /// or `AppRunError::Io` if the HTTP server failed.
    pub async fn run<F>(self, signal: F) -> Result<IngestStats, AppRunError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            orders,
            source,
            pool,
            shutdown,
        } = self;

        let watcher = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = signal => watcher.cancel(),
                () = watcher.cancelled() => {}
            }
        });

        let mut ingest = IngestionLoop::new(source.clone(), orders.clone(), shutdown.clone());
        let ingest_token = shutdown.clone();
        let ingest_task = tokio::spawn(async move {
            let result = ingest.run().await;
            if result.is_err() {
                // Take the HTTP server down with us
                ingest_token.cancel();
            }
            result
        });

        let app = router(AppState::new(orders, pool.clone()));
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("orderflow listening on http://{}", addr);
        }

        let graceful = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .await;

        // The server can also fail on its own; make sure ingestion stops too
        shutdown.cancel();
        let ingested = ingest_task.await;

        source.close();
        if let Some(pool) = pool {
            pool.close().await;
        }
        tracing::info!("Shutdown complete");

        served?;
        Ok(ingested??)
    }
}
