//! Admission rules for decoded order payloads.
//!
//! A payload is admissible when every rule below holds. Violations are
//! collected rather than short-circuited so a rejected message can be logged
//! with everything that was wrong with it.
//!
//! ## Rules
//!
//! - `order_uid` is non-empty and parses as a UUID
//! - `track_number`, `entry`, `locale`, `customer_id`, `delivery_service` are non-empty
//! - `delivery.name`, `delivery.phone`, `delivery.city`, `delivery.address` are non-empty
//! - `delivery.email`, when present, has a non-empty local part and domain
//! - `payment.currency` is non-empty
//! - `payment.transaction`, when present, equals `order_uid`
//! - payment amounts are non-negative and `payment_dt` is a representable timestamp
//! - `items` is non-empty; every item has a `track_number` and `name`,
//!   non-negative `price` / `total_price`, and `sale` within `0..=100`

use core::fmt;

use chrono::DateTime;
use thiserror::Error;

use crate::types::{Delivery, Item, Order, OrderUid, OrderUidError, Payment};

const MAX_SALE_PERCENT: i32 = 100;

/// A single broken rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field, e.g. `items[2].price`.
    pub field: String,
    /// What is wrong with it.
    pub reason: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// The payload is not an admissible order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("order failed validation ({})", join(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Whether a rule on `field` was broken.
    #[must_use]
    pub fn has_violation(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check a decoded order against the admission rules.
///
/// # Errors
///
/// Returns `ValidationError` listing every violated rule.
pub fn validate(order: &Order) -> Result<(), ValidationError> {
    let mut violations = Violations::default();

    match OrderUid::parse(&order.order_uid) {
        Ok(_) => {}
        Err(OrderUidError::Empty) => violations.push("order_uid", "must not be empty"),
        Err(OrderUidError::Malformed(_)) => {
            violations.push("order_uid", "must be a UUID");
        }
    }

    violations.require("track_number", &order.track_number);
    violations.require("entry", &order.entry);
    violations.require("locale", &order.locale);
    violations.require("customer_id", &order.customer_id);
    violations.require("delivery_service", &order.delivery_service);

    check_delivery(&order.delivery, &mut violations);
    check_payment(&order.order_uid, &order.payment, &mut violations);

    if order.items.is_empty() {
        violations.push("items", "must contain at least one item");
    }
    for (index, item) in order.items.iter().enumerate() {
        check_item(index, item, &mut violations);
    }

    violations.finish()
}

fn check_delivery(delivery: &Delivery, violations: &mut Violations) {
    violations.require("delivery.name", &delivery.name);
    violations.require("delivery.phone", &delivery.phone);
    violations.require("delivery.city", &delivery.city);
    violations.require("delivery.address", &delivery.address);

    if !delivery.email.is_empty() && !is_email_shaped(&delivery.email) {
        violations.push("delivery.email", "must look like local@domain");
    }
}

fn check_payment(order_uid: &str, payment: &Payment, violations: &mut Violations) {
    violations.require("payment.currency", &payment.currency);

    if !payment.transaction.is_empty() && payment.transaction != order_uid {
        violations.push("payment.transaction", "must equal order_uid");
    }

    violations.non_negative("payment.amount", payment.amount);
    violations.non_negative("payment.delivery_cost", payment.delivery_cost);
    violations.non_negative("payment.goods_total", payment.goods_total);
    violations.non_negative("payment.custom_fee", payment.custom_fee);

    if payment.payment_dt < 0 || DateTime::from_timestamp(payment.payment_dt, 0).is_none() {
        violations.push("payment.payment_dt", "must be a unix timestamp");
    }
}

fn check_item(index: usize, item: &Item, violations: &mut Violations) {
    let field = |name: &str| format!("items[{index}].{name}");

    if item.track_number.is_empty() {
        violations.push(field("track_number"), "must not be empty");
    }
    if item.name.is_empty() {
        violations.push(field("name"), "must not be empty");
    }
    if item.price < 0 {
        violations.push(field("price"), "must not be negative");
    }
    if item.total_price < 0 {
        violations.push(field("total_price"), "must not be negative");
    }
    if !(0..=MAX_SALE_PERCENT).contains(&item.sale) {
        violations.push(field("sale"), "must be a percentage between 0 and 100");
    }
}

/// Exactly one `@`, with something on either side of it.
fn is_email_shaped(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

#[derive(Default)]
struct Violations(Vec<Violation>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, reason: &'static str) {
        self.0.push(Violation {
            field: field.into(),
            reason,
        });
    }

    fn require(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "must not be empty");
        }
    }

    fn non_negative(&mut self, field: &str, value: i64) {
        if value < 0 {
            self.push(field, "must not be negative");
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations: self.0 })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const UID: &str = "b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e";

    fn valid_order() -> Order {
        Order {
            order_uid: UID.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                phone: "+9720000000".to_string(),
                zip: "2639809".to_string(),
                city: "Kiryat Mozkin".to_string(),
                address: "Ploshad Mira 15".to_string(),
                region: "Kraiot".to_string(),
                email: "test@gmail.com".to_string(),
            },
            payment: Payment {
                transaction: UID.to_string(),
                currency: "USD".to_string(),
                provider: "wbpay".to_string(),
                amount: 1817,
                payment_dt: 1_637_907_727,
                bank: "alpha".to_string(),
                delivery_cost: 1500,
                goods_total: 317,
                ..Payment::default()
            },
            items: vec![Item {
                chrt_id: 9_934_930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                name: "Mascaras".to_string(),
                sale: 30,
                total_price: 317,
                ..Item::default()
            }],
            locale: "en".to_string(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            ..Order::default()
        }
    }

    #[test]
    fn test_valid_order_passes() {
        assert!(validate(&valid_order()).is_ok());
    }

    #[test]
    fn test_empty_uid() {
        let mut order = valid_order();
        order.order_uid = String::new();
        order.payment.transaction = String::new();
        let err = validate(&order).unwrap_err();
        assert!(err.has_violation("order_uid"));
    }

    #[test]
    fn test_non_uuid_uid() {
        let mut order = valid_order();
        order.order_uid = "b563feb7-b2b8-4b6b-9b45-test".to_string();
        order.payment.transaction = order.order_uid.clone();
        let err = validate(&order).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].reason, "must be a UUID");
    }

    #[test]
    fn test_empty_object_reports_every_missing_field() {
        let err = validate(&Order::default()).unwrap_err();
        for field in [
            "order_uid",
            "track_number",
            "delivery.name",
            "payment.currency",
            "items",
        ] {
            assert!(err.has_violation(field), "missing violation for {field}");
        }
    }

    #[test]
    fn test_transaction_mismatch() {
        let mut order = valid_order();
        order.payment.transaction = "another".to_string();
        let err = validate(&order).unwrap_err();
        assert!(err.has_violation("payment.transaction"));
    }

    #[test]
    fn test_empty_transaction_is_allowed() {
        let mut order = valid_order();
        order.payment.transaction = String::new();
        assert!(validate(&order).is_ok());
    }

    #[test]
    fn test_negative_amount() {
        let mut order = valid_order();
        order.payment.amount = -1;
        let err = validate(&order).unwrap_err();
        assert!(err.has_violation("payment.amount"));
    }

    #[test]
    fn test_item_rules_are_indexed() {
        let mut order = valid_order();
        order.items.push(Item {
            sale: 150,
            price: -5,
            ..Item::default()
        });
        let err = validate(&order).unwrap_err();
        assert!(err.has_violation("items[1].sale"));
        assert!(err.has_violation("items[1].price"));
        assert!(err.has_violation("items[1].name"));
        assert!(!err.has_violation("items[0].name"));
    }

    #[test]
    fn test_bad_email() {
        let mut order = valid_order();
        order.delivery.email = "no-at-symbol".to_string();
        assert!(validate(&order).unwrap_err().has_violation("delivery.email"));

        order.delivery.email = String::new();
        assert!(validate(&order).is_ok());
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let mut order = valid_order();
        order.locale = "   ".to_string();
        assert!(validate(&order).unwrap_err().has_violation("locale"));
    }

    #[test]
    fn test_error_display_lists_violations() {
        let mut order = valid_order();
        order.locale = String::new();
        order.entry = String::new();
        let message = validate(&order).unwrap_err().to_string();
        assert_eq!(
            message,
            "order failed validation (entry: must not be empty; locale: must not be empty)"
        );
    }
}
