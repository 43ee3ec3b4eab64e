//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Orders
//! GET  /api/order/{id}         - Order by uid, cache first
//! ```

pub mod health;
pub mod orders;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Create the order API routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new().route("/{id}", get(orders::show))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/order", order_routes())
}
