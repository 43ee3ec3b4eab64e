//! Wire ↔ domain conversions.
//!
//! `to_aggregate` is the only way to obtain an [`OrderAggregate`] from a
//! payload; it derives `payment.transaction` from the order uid and fixes the
//! item positions. `to_wire` is infallible and is the inverse for every
//! aggregate produced by `to_aggregate`.
//!
//! Timestamps are cut to microseconds on the way in, the finest precision a
//! `TIMESTAMPTZ` column stores, so the cached wire form and a store read agree.

use chrono::{DateTime, SubsecRound};
use thiserror::Error;

use crate::types::{
    Delivery, DeliveryRecord, Item, ItemRecord, Order, OrderAggregate, OrderRecord, OrderUid,
    OrderUidError, Payment, PaymentRecord,
};

/// Errors raised while mapping a wire order to its domain form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The order uid is not a UUID.
    #[error("invalid order uid: {0}")]
    InvalidUid(#[from] OrderUidError),

    /// `payment_dt` cannot be represented as a timestamp.
    #[error("payment_dt out of range: {0}")]
    PaymentTimestamp(i64),

    /// More items than a position column can index.
    #[error("too many items: {0}")]
    TooManyItems(usize),
}

const STORED_SUBSEC_DIGITS: u16 = 6;

/// Map a wire order into the aggregate that gets persisted.
///
/// # Errors
///
/// Returns `MappingError` if the uid does not parse, `payment_dt` is out of
/// range, or the item list is too large to index.
pub fn to_aggregate(order: &Order) -> Result<OrderAggregate, MappingError> {
    let id = OrderUid::parse(&order.order_uid)?;

    let payment_dt = DateTime::from_timestamp(order.payment.payment_dt, 0)
        .ok_or(MappingError::PaymentTimestamp(order.payment.payment_dt))?;

    let header = OrderRecord {
        id,
        track_number: order.track_number.clone(),
        entry: order.entry.clone(),
        locale: order.locale.clone(),
        internal_signature: order.internal_signature.clone(),
        customer_id: order.customer_id.clone(),
        delivery_service: order.delivery_service.clone(),
        shard_key: order.shardkey.clone(),
        sm_id: order.sm_id,
        date_created: order.date_created.trunc_subsecs(STORED_SUBSEC_DIGITS),
        oof_shard: order.oof_shard.clone(),
    };

    let delivery = DeliveryRecord {
        order_id: id,
        name: order.delivery.name.clone(),
        phone: order.delivery.phone.clone(),
        zip: order.delivery.zip.clone(),
        city: order.delivery.city.clone(),
        address: order.delivery.address.clone(),
        region: order.delivery.region.clone(),
        email: order.delivery.email.clone(),
    };

    let payment = PaymentRecord {
        transaction: id,
        order_id: id,
        request_id: order.payment.request_id.clone(),
        currency: order.payment.currency.clone(),
        provider: order.payment.provider.clone(),
        amount: order.payment.amount,
        payment_dt,
        bank: order.payment.bank.clone(),
        delivery_cost: order.payment.delivery_cost,
        goods_total: order.payment.goods_total,
        custom_fee: order.payment.custom_fee,
    };

    let items = order
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let position =
                i32::try_from(index).map_err(|_| MappingError::TooManyItems(order.items.len()))?;
            Ok(convert_item(id, position, item))
        })
        .collect::<Result<Vec<_>, MappingError>>()?;

    Ok(OrderAggregate {
        order: header,
        delivery,
        payment,
        items,
    })
}

fn convert_item(order_id: OrderUid, position: i32, item: &Item) -> ItemRecord {
    ItemRecord {
        order_id,
        position,
        chrt_id: item.chrt_id,
        track_number: item.track_number.clone(),
        price: item.price,
        rid: item.rid.clone(),
        name: item.name.clone(),
        sale: item.sale,
        size: item.size.clone(),
        total_price: item.total_price,
        nm_id: item.nm_id,
        brand: item.brand.clone(),
        status: item.status,
    }
}

/// Map a persisted aggregate back to the wire format.
#[must_use]
pub fn to_wire(aggregate: &OrderAggregate) -> Order {
    let OrderAggregate {
        order,
        delivery,
        payment,
        items,
    } = aggregate;

    let mut items: Vec<&ItemRecord> = items.iter().collect();
    items.sort_by_key(|item| item.position);

    Order {
        order_uid: order.id.to_string(),
        track_number: order.track_number.clone(),
        entry: order.entry.clone(),
        delivery: Delivery {
            name: delivery.name.clone(),
            phone: delivery.phone.clone(),
            zip: delivery.zip.clone(),
            city: delivery.city.clone(),
            address: delivery.address.clone(),
            region: delivery.region.clone(),
            email: delivery.email.clone(),
        },
        payment: Payment {
            transaction: payment.transaction.to_string(),
            request_id: payment.request_id.clone(),
            currency: payment.currency.clone(),
            provider: payment.provider.clone(),
            amount: payment.amount,
            payment_dt: payment.payment_dt.timestamp(),
            bank: payment.bank.clone(),
            delivery_cost: payment.delivery_cost,
            goods_total: payment.goods_total,
            custom_fee: payment.custom_fee,
        },
        items: items
            .into_iter()
            .map(|item| Item {
                chrt_id: item.chrt_id,
                track_number: item.track_number.clone(),
                price: item.price,
                rid: item.rid.clone(),
                name: item.name.clone(),
                sale: item.sale,
                size: item.size.clone(),
                total_price: item.total_price,
                nm_id: item.nm_id,
                brand: item.brand.clone(),
                status: item.status,
            })
            .collect(),
        locale: order.locale.clone(),
        internal_signature: order.internal_signature.clone(),
        customer_id: order.customer_id.clone(),
        delivery_service: order.delivery_service.clone(),
        shardkey: order.shard_key.clone(),
        sm_id: order.sm_id,
        date_created: order.date_created,
        oof_shard: order.oof_shard.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const UID: &str = "b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e";

    fn order() -> Order {
        Order {
            order_uid: UID.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            payment: Payment {
                transaction: UID.to_string(),
                currency: "USD".to_string(),
                amount: 1817,
                payment_dt: 1_637_907_727,
                ..Payment::default()
            },
            items: vec![
                Item {
                    chrt_id: 9_934_930,
                    name: "Mascaras".to_string(),
                    price: 453,
                    ..Item::default()
                },
                Item {
                    chrt_id: 1,
                    name: "Lipstick".to_string(),
                    ..Item::default()
                },
            ],
            ..Order::default()
        }
    }

    #[test]
    fn test_transaction_is_derived_from_uid() {
        let mut wire = order();
        wire.payment.transaction = String::new();

        let aggregate = to_aggregate(&wire).unwrap();
        assert_eq!(aggregate.payment.transaction, aggregate.order.id);
        assert_eq!(aggregate.payment.order_id, aggregate.order.id);
        assert_eq!(to_wire(&aggregate).payment.transaction, UID);
    }

    #[test]
    fn test_items_get_positions_in_payload_order() {
        let aggregate = to_aggregate(&order()).unwrap();
        assert_eq!(aggregate.items[0].position, 0);
        assert_eq!(aggregate.items[0].name, "Mascaras");
        assert_eq!(aggregate.items[1].position, 1);
        assert!(aggregate.items.iter().all(|i| i.order_id == aggregate.id()));
    }

    #[test]
    fn test_round_trip() {
        let wire = order();
        assert_eq!(to_wire(&to_aggregate(&wire).unwrap()), wire);
    }

    #[test]
    fn test_date_created_keeps_only_microseconds() {
        let mut wire = order();
        wire.date_created = "2021-11-26T06:22:19.123456789Z".parse().unwrap();

        let aggregate = to_aggregate(&wire).unwrap();
        let served = to_wire(&aggregate);

        assert_eq!(
            served.date_created.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            "2021-11-26T06:22:19.123456Z"
        );
        assert_eq!(to_wire(&to_aggregate(&served).unwrap()), served);
    }

    #[test]
    fn test_to_wire_sorts_by_position() {
        let mut aggregate = to_aggregate(&order()).unwrap();
        aggregate.items.reverse();
        let names: Vec<_> = to_wire(&aggregate)
            .items
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["Mascaras", "Lipstick"]);
    }

    #[test]
    fn test_invalid_uid_is_rejected() {
        let mut wire = order();
        wire.order_uid = "b563feb7-b2b8-4b6b-9b45-test".to_string();
        assert!(matches!(
            to_aggregate(&wire),
            Err(MappingError::InvalidUid(_))
        ));
    }

    #[test]
    fn test_payment_dt_out_of_range() {
        let mut wire = order();
        wire.payment.payment_dt = i64::MAX;
        assert_eq!(
            to_aggregate(&wire),
            Err(MappingError::PaymentTimestamp(i64::MAX))
        );
    }
}
