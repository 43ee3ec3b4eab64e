//! Order service: the only component that touches both the cache and the store.
//!
//! # Write path
//!
//! Map the wire order to its aggregate, persist it, and only then populate the
//! cache. A failed write leaves the cache untouched, so the cache never holds
//! an order the store does not.
//!
//! # Read path
//!
//! Cache-aside: probe the cache, fall back to the store on a miss, and refill
//! the cache from the store result according to [`RefillPolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use orderflow_core::{MappingError, Order, OrderUid, to_aggregate, to_wire};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cache::OrderCache;
use crate::db::{OrderStore, RepositoryError};

/// Whether a store fallback on the read path repopulates the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefillPolicy {
    /// Insert orders loaded from the store into the cache.
    #[default]
    OnMiss,
    /// Only the write path populates the cache.
    Never,
}

impl FromStr for RefillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-miss" | "on_miss" | "always" => Ok(Self::OnMiss),
            "never" | "off" => Ok(Self::Never),
            other => Err(format!("expected `on-miss` or `never`, got `{other}`")),
        }
    }
}

impl fmt::Display for RefillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnMiss => f.write_str("on-miss"),
            Self::Never => f.write_str("never"),
        }
    }
}

/// Errors returned by [`OrderService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The order could not be mapped to its domain form.
    #[error("invalid order: {0}")]
    Mapping(#[from] MappingError),

    /// No order with the requested uid exists.
    #[error("order not found")]
    NotFound,

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[source] RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

/// Coordinates the order store and the order cache.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    refill: RefillPolicy,
}

impl OrderService {
    /// Create a new order service.
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        refill: RefillPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            refill,
        }
    }

    /// Configured refill policy.
    #[must_use]
    pub const fn refill_policy(&self) -> RefillPolicy {
        self.refill
    }

    /// Persist an order and, once it is committed, cache it.
    ///
    /// The cached value is the wire form of the committed aggregate, so it is
    /// identical to what a later store read would return.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Mapping` if the order cannot be mapped (nothing
    /// is written), or `ServiceError::Store` if persistence fails (the cache
    /// is not touched).
    #[instrument(skip_all, fields(order_uid = %order.order_uid))]
    pub async fn create_order(&self, order: &Order) -> Result<(), ServiceError> {
        let aggregate = to_aggregate(order)?;

        self.store
            .create_order(&aggregate)
            .await
            .map_err(ServiceError::Store)?;

        let key = aggregate.id().to_string();
        self.cache.set(&key, to_wire(&aggregate));
        debug!("Order cached after commit");

        Ok(())
    }

    /// Look up an order, cache first.
    ///
    /// An id that is not a UUID cannot name a stored order and is reported as
    /// `NotFound` without querying the store.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if no such order exists, or
    /// `ServiceError::Store` if the store fails.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_uid: &str) -> Result<Order, ServiceError> {
        if let Some(order) = self.cache.get(order_uid) {
            debug!("Cache hit");
            return Ok(order);
        }

        let Ok(id) = OrderUid::parse(order_uid) else {
            debug!("Requested id is not a UUID");
            return Err(ServiceError::NotFound);
        };

        // Entries are keyed by the canonical form; retry if the request used another
        let key = id.to_string();
        if key != order_uid
            && let Some(order) = self.cache.get(&key)
        {
            debug!("Cache hit on canonical key");
            return Ok(order);
        }

        debug!("Cache miss, reading from store");
        let aggregate = self.store.get_order(id).await?;
        let order = to_wire(&aggregate);

        if self.refill == RefillPolicy::OnMiss {
            self.cache.set(&key, order.clone());
        }

        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orderflow_core::{Delivery, Item, Payment};

    use super::*;
    use crate::cache::MokaOrderCache;
    use crate::db::MemoryOrderStore;

    const UID: &str = "b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e";

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                city: "Kiryat Mozkin".to_string(),
                ..Delivery::default()
            },
            payment: Payment {
                transaction: uid.to_string(),
                currency: "USD".to_string(),
                amount: 1817,
                payment_dt: 1_637_907_727,
                ..Payment::default()
            },
            items: vec![Item {
                chrt_id: 9_934_930,
                price: 453,
                name: "Mascaras".to_string(),
                ..Item::default()
            }],
            locale: "en".to_string(),
            ..Order::default()
        }
    }

    fn service(refill: RefillPolicy) -> (OrderService, Arc<MemoryOrderStore>, Arc<MokaOrderCache>) {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = Arc::new(MokaOrderCache::new(100));
        let service = OrderService::new(store.clone(), cache.clone(), refill);
        (service, store, cache)
    }

    #[tokio::test]
    async fn test_create_populates_cache() {
        let (service, store, cache) = service(RefillPolicy::OnMiss);

        service.create_order(&order(UID)).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(cache.get(UID).unwrap(), order(UID));
    }

    #[tokio::test]
    async fn test_get_after_create_is_a_cache_hit() {
        let (service, store, _cache) = service(RefillPolicy::OnMiss);

        service.create_order(&order(UID)).await.unwrap();
        let found = service.get_order(UID).await.unwrap();

        assert_eq!(found, order(UID));
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let (service, store, cache) = service(RefillPolicy::OnMiss);
        store.fail_writes(true);

        let err = service.create_order(&order(UID)).await.unwrap_err();

        assert!(matches!(err, ServiceError::Store(_)));
        assert!(cache.get(UID).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unmappable_order_never_reaches_store() {
        let (service, store, cache) = service(RefillPolicy::OnMiss);

        let err = service
            .create_order(&order("b563feb7-b2b8-4b6b-9b45-test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Mapping(_)));
        assert_eq!(store.writes(), 0);
        assert!(cache.get("b563feb7-b2b8-4b6b-9b45-test").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_a_store_error() {
        let (service, _store, _cache) = service(RefillPolicy::OnMiss);

        service.create_order(&order(UID)).await.unwrap();
        let err = service.create_order(&order(UID)).await.unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Store(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_miss_falls_back_to_store_and_refills() {
        let (writer, store, _) = service(RefillPolicy::OnMiss);
        writer.create_order(&order(UID)).await.unwrap();

        // A second instance shares the store but starts with a cold cache
        let cache = Arc::new(MokaOrderCache::new(100));
        let reader = OrderService::new(store.clone(), cache.clone(), RefillPolicy::OnMiss);

        assert_eq!(reader.get_order(UID).await.unwrap(), order(UID));
        assert_eq!(store.reads(), 1);
        assert!(cache.get(UID).is_some());

        reader.get_order(UID).await.unwrap();
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_never_policy_does_not_refill() {
        let (writer, store, _) = service(RefillPolicy::OnMiss);
        writer.create_order(&order(UID)).await.unwrap();

        let cache = Arc::new(MokaOrderCache::new(100));
        let reader = OrderService::new(store.clone(), cache.clone(), RefillPolicy::Never);

        reader.get_order(UID).await.unwrap();
        reader.get_order(UID).await.unwrap();

        assert_eq!(store.reads(), 2);
        assert!(cache.get(UID).is_none());
    }

    #[tokio::test]
    async fn test_unknown_uid_is_not_found() {
        let (service, _store, _cache) = service(RefillPolicy::OnMiss);

        let err = service
            .get_order("0d6a4f58-8a0e-4bd4-a4a3-8d0e0b0d0b0d")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_non_uuid_is_not_found_without_store_access() {
        let (service, store, _cache) = service(RefillPolicy::OnMiss);

        let err = service.get_order("does-not-exist").await.unwrap_err();

        assert!(matches!(err, ServiceError::NotFound));
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_on_read() {
        let (service, store, _cache) = service(RefillPolicy::OnMiss);
        store.fail_reads(true);

        let err = service.get_order(UID).await.unwrap_err();

        assert!(matches!(err, ServiceError::Store(_)));
    }

    #[tokio::test]
    async fn test_uppercase_id_hits_canonical_entry() {
        let (service, store, _cache) = service(RefillPolicy::OnMiss);
        service.create_order(&order(UID)).await.unwrap();

        let found = service.get_order(&UID.to_uppercase()).await.unwrap();

        assert_eq!(found.order_uid, UID);
        assert_eq!(store.reads(), 0);
    }

    #[test]
    fn test_refill_policy_parse() {
        assert_eq!("on-miss".parse::<RefillPolicy>(), Ok(RefillPolicy::OnMiss));
        assert_eq!("NEVER".parse::<RefillPolicy>(), Ok(RefillPolicy::Never));
        assert!("sometimes".parse::<RefillPolicy>().is_err());
        assert_eq!(RefillPolicy::OnMiss.to_string(), "on-miss");
    }
}
