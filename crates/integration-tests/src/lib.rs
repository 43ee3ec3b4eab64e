//! Integration tests for orderflow.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process pipeline and HTTP tests
//! cargo test -p orderflow-integration-tests
//!
//! # PostgreSQL-backed tests (needs DATABASE_URL and a migrated database)
//! cargo test -p orderflow-integration-tests -- --ignored
//! ```
//!
//! [`TestContext`] runs the real [`App`] on an ephemeral port with an
//! in-memory store and a channel broker, so tests publish payloads and read
//! orders back over HTTP exactly as a client would.

use std::sync::Arc;
use std::time::Duration;

use orderflow_server::broker::{ChannelSender, ChannelSource};
use orderflow_server::cache::{MokaOrderCache, OrderCache};
use orderflow_server::db::MemoryOrderStore;
use orderflow_server::ingest::IngestStats;
use orderflow_server::service::{OrderService, RefillPolicy};
use orderflow_server::{App, AppRunError};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Order uid used by the fixture payload.
pub const FIXTURE_UID: &str = "b563feb7-b2b8-4b6b-9b45-4c1e4c1e4c1e";

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The sample order payload.
///
/// # Panics
///
/// Panics if the fixture is not valid JSON.
#[must_use]
pub fn fixture() -> Value {
    serde_json::from_str(include_str!("../fixtures/order.json")).expect("fixture is valid JSON")
}

/// The sample order with `order_uid` and `payment.transaction` set to `uid`.
#[must_use]
pub fn order_with_uid(uid: &str) -> Value {
    let mut order = fixture();
    order["order_uid"] = Value::String(uid.to_string());
    order["payment"]["transaction"] = Value::String(uid.to_string());
    order
}

/// Builder for [`TestContext`].
pub struct TestContextBuilder {
    store: Arc<MemoryOrderStore>,
    capacity: u64,
    refill: RefillPolicy,
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryOrderStore::new()),
            capacity: 1000,
            refill: RefillPolicy::OnMiss,
        }
    }
}

impl TestContextBuilder {
    /// Share an existing store.
    #[must_use]
    pub fn store(mut self, store: Arc<MemoryOrderStore>) -> Self {
        self.store = store;
        self
    }

    /// Cache capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Read-path refill policy.
    #[must_use]
    pub const fn refill(mut self, refill: RefillPolicy) -> Self {
        self.refill = refill;
        self
    }

    /// Bind an ephemeral port and start the application.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start(self) -> TestContext {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let (sender, source) = ChannelSource::pair();

        let cache = Arc::new(MokaOrderCache::new(self.capacity));
        let orders = OrderService::new(self.store.clone(), cache.clone(), self.refill);
        let app = App::from_parts(listener, orders, Arc::new(source), None);

        let base_url = format!(
            "http://{}",
            app.local_addr().expect("Failed to read local address")
        );
        let shutdown = app.shutdown_token();
        let handle = tokio::spawn(app.run(std::future::pending::<()>()));

        TestContext {
            sender,
            store: self.store,
            cache,
            client: reqwest::Client::new(),
            base_url,
            shutdown,
            handle,
        }
    }
}

/// A running application plus handles on its collaborators.
pub struct TestContext {
    /// Publishes payloads to the ingestion loop.
    pub sender: ChannelSender,
    /// Backing store.
    pub store: Arc<MemoryOrderStore>,
    /// The cache the application reads through.
    pub cache: Arc<MokaOrderCache>,
    pub client: reqwest::Client,
    base_url: String,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<IngestStats, AppRunError>>,
}

impl TestContext {
    /// Start with default settings.
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    #[must_use]
    pub fn builder() -> TestContextBuilder {
        TestContextBuilder::default()
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Publish a JSON payload.
    pub fn publish(&self, payload: &Value) {
        assert!(self.sender.send(payload.to_string()), "ingestion loop is gone");
    }

    /// Publish raw bytes.
    pub fn publish_raw(&self, payload: impl Into<Vec<u8>>) {
        assert!(self.sender.send(payload), "ingestion loop is gone");
    }

    /// `GET /api/order/{id}` and decode the JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the request fails or the body is not JSON.
    pub async fn get_order(&self, id: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(&format!("/api/order/{id}")))
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status();
        let body = response.json().await.expect("Response body is not JSON");
        (status, body)
    }

    /// Wait until the order with `uid` has been persisted and cached.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within a few seconds.
    pub async fn wait_for_order(&self, uid: &str) {
        let ingested = self.wait_until(|ctx| ctx.cache.get(uid).is_some()).await;
        assert!(ingested, "order {uid} was not ingested in time");
    }

    /// Poll `condition` until it holds. Returns `false` on timeout.
    pub async fn wait_until(&self, condition: impl Fn(&Self) -> bool) -> bool {
        tokio::time::timeout(WAIT_TIMEOUT, async {
            while !condition(self) {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }

    /// Whether the application has exited on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the application and wait for it to exit.
    ///
    /// # Panics
    ///
    /// Panics if the application task panicked.
    pub async fn stop(self) -> Result<IngestStats, AppRunError> {
        self.shutdown.cancel();
        self.handle.await.expect("application task panicked")
    }

    /// Wait for the application to exit without cancelling it.
    ///
    /// # Panics
    ///
    /// Panics if the application task panicked or does not exit in time.
    pub async fn join(self) -> Result<IngestStats, AppRunError> {
        tokio::time::timeout(WAIT_TIMEOUT, self.handle)
            .await
            .expect("application did not exit in time")
            .expect("application task panicked")
    }
}
