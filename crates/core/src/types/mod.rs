//! Core types for orderflow.
//!
//! This module provides the wire and domain representations of an order.

pub mod aggregate;
pub mod id;
pub mod order;

pub use aggregate::{DeliveryRecord, ItemRecord, OrderAggregate, OrderRecord, PaymentRecord};
pub use id::{OrderUid, OrderUidError};
pub use order::{Delivery, Item, Order, Payment};
