//! In-memory order store for tests.
//!
//! Behaves like the `PostgreSQL` repository at the trait boundary: inserts
//! are all-or-nothing, duplicates are conflicts, unknown ids are `NotFound`.
//! Writes can be made to fail on demand to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use orderflow_core::{OrderAggregate, OrderUid};

use super::{OrderStore, RepositoryError};

/// Order store held in a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<OrderUid, OrderAggregate>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create_order` fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get_order` fail with a database error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_order` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `create_order` calls attempted so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no order has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an order with this uid is stored.
    #[must_use]
    pub fn contains(&self, id: OrderUid) -> bool {
        self.lock().contains_key(&id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OrderUid, OrderAggregate>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, order: &OrderAggregate) -> Result<(), RepositoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut orders = self.lock();
        if orders.contains_key(&order.id()) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                order.id()
            )));
        }
        orders.insert(order.id(), order.clone());
        drop(orders);

        Ok(())
    }

    async fn get_order(&self, id: OrderUid) -> Result<OrderAggregate, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        self.lock().get(&id).cloned().ok_or(RepositoryError::NotFound)
    }
}
