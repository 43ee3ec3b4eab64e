//! Order aggregate (domain types).
//!
//! These types represent a validated order split into the rows it is
//! persisted as. An [`OrderAggregate`] is always written and read as a unit.

use chrono::{DateTime, Utc};

use super::id::OrderUid;

/// Order header row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct OrderRecord {
    pub id: OrderUid,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shard_key: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Delivery row, one per order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct DeliveryRecord {
    pub order_id: OrderUid,
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment row, one per order.
///
/// `transaction` is always the owning order's id.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct PaymentRecord {
    pub transaction: OrderUid,
    pub order_id: OrderUid,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: DateTime<Utc>,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// Item row. `position` keeps the payload ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ItemRecord {
    pub order_id: OrderUid,
    pub position: i32,
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

/// A full order: header, delivery, payment and items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAggregate {
    pub order: OrderRecord,
    pub delivery: DeliveryRecord,
    pub payment: PaymentRecord,
    pub items: Vec<ItemRecord>,
}

impl OrderAggregate {
    /// The aggregate's identifier.
    #[must_use]
    pub const fn id(&self) -> OrderUid {
        self.order.id
    }
}
