//! orderflow server library.
//!
//! Consumes order documents from a message broker, persists them to
//! `PostgreSQL`, keeps recently seen orders in a bounded in-memory cache and
//! serves them over HTTP.
//!
//! ```text
//!  broker ──▶ ingest ──▶ OrderService ──▶ OrderStore (PostgreSQL)
//!                             │   ▲
//!                             ▼   │
//!                         OrderCache ◀── GET /api/order/{id}
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod broker;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod state;

pub use app::{App, AppRunError, router};
