//! Order wire format.
//!
//! These types mirror the JSON payload published on the orders topic and
//! returned by `GET /api/order/{id}`. Decoding is lenient: any missing field
//! falls back to its zero value so that shape problems are reported by
//! [`crate::validation::validate`] rather than by the JSON decoder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An order as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Delivery recipient and address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details. Monetary amounts are integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix timestamp, seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// A single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Discount percentage.
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn test_decode_sample() {
        let order: Order = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(order.track_number, "WBILMTESTTRACK");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.payment.payment_dt, 1_637_907_727);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].chrt_id, 9_934_930);
        assert_eq!(order.date_created.to_rfc3339(), "2021-11-26T06:22:19+00:00");
    }

    #[test]
    fn test_missing_fields_decode_to_defaults() {
        let order: Order = serde_json::from_str(r#"{"order_uid": "x"}"#).unwrap();
        assert_eq!(order.order_uid, "x");
        assert!(order.items.is_empty());
        assert_eq!(order.payment, Payment::default());
    }

    #[test]
    fn test_wrong_type_is_a_decode_error() {
        let result = serde_json::from_str::<Order>(r#"{"sm_id": "ninety-nine"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialized_date_uses_zulu_suffix() {
        let order: Order = serde_json::from_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["date_created"], "2021-11-26T06:22:19Z");
    }

    #[test]
    fn test_item_order_preserved() {
        let json = r#"{"items": [{"name": "first"}, {"name": "second"}, {"name": "third"}]}"#;
        let order: Order = serde_json::from_str(json).unwrap();
        let names: Vec<_> = order.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }
}
