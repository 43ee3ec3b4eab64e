//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::service::OrderService;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orders: OrderService,
    pool: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `pool` is probed by the readiness endpoint; pass `None` when the order
    /// store is not backed by `PostgreSQL`.
    #[must_use]
    pub fn new(orders: OrderService, pool: Option<PgPool>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { orders, pool }),
        }
    }

    /// Get a reference to the order service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// Get a reference to the database connection pool, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
