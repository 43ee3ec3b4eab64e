//! `PostgreSQL` order repository.
//!
//! Queries are built at runtime (`sqlx::query` / `sqlx::query_as`) so the
//! crate compiles without a live database or offline query metadata.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use orderflow_core::{
    DeliveryRecord, ItemRecord, OrderAggregate, OrderRecord, OrderUid, PaymentRecord,
};

use super::{OrderStore, RepositoryError};

/// Repository for order aggregates backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    /// Insert the header, delivery, payment and items in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order uid already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip_all, fields(order_uid = %aggregate.id()))]
    async fn create_order(&self, aggregate: &OrderAggregate) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = &aggregate.order;
        sqlx::query(
            r"
            INSERT INTO orders (
                id, track_number, entry, locale, internal_signature, customer_id,
                delivery_service, shard_key, sm_id, date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(order.id)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(format!("order {} already exists", order.id));
            }
            RepositoryError::Database(e)
        })?;

        let delivery = &aggregate.delivery;
        sqlx::query(
            r"
            INSERT INTO deliveries (order_id, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(delivery.order_id)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut *tx)
        .await?;

        let payment = &aggregate.payment;
        sqlx::query(
            r"
            INSERT INTO payments (
                transaction, order_id, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(payment.transaction)
        .bind(payment.order_id)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        if !aggregate.items.is_empty() {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO items (order_id, position, chrt_id, track_number, price, rid, \
                 name, sale, size, total_price, nm_id, brand, status) ",
            );
            builder.push_values(&aggregate.items, |mut row, item| {
                row.push_bind(item.order_id)
                    .push_bind(item.position)
                    .push_bind(item.chrt_id)
                    .push_bind(&item.track_number)
                    .push_bind(item.price)
                    .push_bind(&item.rid)
                    .push_bind(&item.name)
                    .push_bind(item.sale)
                    .push_bind(&item.size)
                    .push_bind(item.total_price)
                    .push_bind(item.nm_id)
                    .push_bind(&item.brand)
                    .push_bind(item.status);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(items = aggregate.items.len(), "Order persisted");

        Ok(())
    }

    /// Load the header, delivery, payment and items for one order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if there is no such order.
    /// Returns `RepositoryError::DataCorruption` if the delivery or payment row is missing.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self), fields(order_uid = %id))]
    async fn get_order(&self, id: OrderUid) -> Result<OrderAggregate, RepositoryError> {
        let order = sqlx::query_as::<_, OrderRecord>(
            r"
            SELECT id, track_number, entry, locale, internal_signature, customer_id,
                   delivery_service, shard_key, sm_id, date_created, oof_shard
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let delivery = sqlx::query_as::<_, DeliveryRecord>(
            r"
            SELECT order_id, name, phone, zip, city, address, region, email
            FROM deliveries
            WHERE order_id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::DataCorruption(format!("order {id} has no delivery")))?;

        let payment = sqlx::query_as::<_, PaymentRecord>(
            r"
            SELECT transaction, order_id, request_id, currency, provider, amount,
                   payment_dt, bank, delivery_cost, goods_total, custom_fee
            FROM payments
            WHERE order_id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::DataCorruption(format!("order {id} has no payment")))?;

        let items = sqlx::query_as::<_, ItemRecord>(
            r"
            SELECT order_id, position, chrt_id, track_number, price, rid, name, sale,
                   size, total_price, nm_id, brand, status
            FROM items
            WHERE order_id = $1
            ORDER BY position
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderAggregate {
            order,
            delivery,
            payment,
            items,
        })
    }
}
