//! orderflow core - order model shared by the server and the CLI.
//!
//! This crate provides the order types used across all orderflow components:
//! - `server` - Kafka ingestion pipeline and HTTP read API
//! - `cli` - Migrations, order publishing and offline validation
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no broker clients. Two representations of an order live here:
//!
//! - [`types::Order`] - the JSON wire format carried on the topic and returned
//!   by the HTTP API
//! - [`types::OrderAggregate`] - the validated, strongly typed domain form used
//!   for persistence
//!
//! # Modules
//!
//! - [`types`] - Wire and domain order types, `OrderUid`
//! - [`validation`] - Admission rules for decoded payloads
//! - [`conversions`] - Wire ↔ domain mapping

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod conversions;
pub mod types;
pub mod validation;

pub use conversions::{MappingError, to_aggregate, to_wire};
pub use types::*;
pub use validation::{ValidationError, Violation, validate};
