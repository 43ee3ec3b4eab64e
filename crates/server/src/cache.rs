//! Bounded in-memory order cache.
//!
//! Readers and writers depend on the [`OrderCache`] capability only; the
//! default backing is a `moka` cache bounded by entry count with no TTL.
//! Values are the wire form of an order, keyed by its uid string.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use orderflow_core::Order;

/// Key → order map shared by the ingestion path and the read path.
///
/// Implementations must bound their size and be safe for concurrent use.
pub trait OrderCache: Send + Sync {
    /// Insert or overwrite an entry, evicting another one if the cache is full.
    fn set(&self, key: &str, order: Order);

    /// Look up an entry. A miss is `None`, never an error.
    fn get(&self, key: &str) -> Option<Order>;
}

/// `moka`-backed [`OrderCache`].
///
/// Eviction is plain LRU, so a fresh insert is always admitted and the least
/// recently used entry makes room for it. moka applies evictions in a deferred
/// maintenance pass, so `set` runs that pass before returning; once it
/// returns, no more than `capacity` entries are readable.
#[derive(Clone)]
pub struct MokaOrderCache {
    inner: Cache<String, Order>,
    capacity: u64,
}

impl MokaOrderCache {
    /// Create a cache holding at most `capacity` orders.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .name("orders")
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { inner, capacity }
    }

    /// Configured maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Approximate number of resident entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending evictions now.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }
}

impl std::fmt::Debug for MokaOrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaOrderCache")
            .field("capacity", &self.capacity)
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl OrderCache for MokaOrderCache {
    fn set(&self, key: &str, order: Order) {
        self.inner.insert(key.to_owned(), order);
        self.inner.run_pending_tasks();
    }

    fn get(&self, key: &str) -> Option<Order> {
        self.inner.get(key)
    }
}
