//! Order ingestion loop.
//!
//! Pulls payloads from a [`MessageSource`] one at a time, decodes and
//! validates them, and hands admissible orders to [`OrderService`].
//!
//! ```text
//!            ┌──────── Skip / Retry ────────┐
//!            ▼                              │
//!   ┌─────────────┐  consume → decode → validate → create
//!   │   Running   │───────────────────────────────────────┐
//!   └─────────────┘                                       │
//!        │ cancelled                         Fatal        │
//!        ▼                                                ▼
//!   ┌─────────────┐ ◀─────────────────────────────────────┘
//!   │   Stopped   │
//!   └─────────────┘
//! ```
//!
//! Every failure is classified once by [`IngestError::disposition`]:
//! bad payloads and failed writes are skipped (at-most-once, no redelivery),
//! transient broker errors are retried with backoff, and anything else stops
//! the loop and is returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use orderflow_core::{Order, ValidationError, validate};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{ConsumeError, Message, MessageSource};
use crate::service::{OrderService, ServiceError};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What the loop does after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Drop the message and move on.
    Skip,
    /// Back off, then consume again.
    Retry,
    /// Stop the loop and report the error.
    Fatal,
}

/// Lifecycle of an [`IngestionLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Anything that can go wrong while ingesting one message.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Reading from the broker failed.
    #[error("failed to read message: {0}")]
    Consume(#[from] ConsumeError),

    /// The payload is not an order document.
    #[error("failed to decode order: {0}")]
    Decode(#[from] serde_json::Error),

    /// The order is not admissible.
    #[error("failed to validate order: {0}")]
    Invalid(#[from] ValidationError),

    /// The order could not be persisted.
    #[error("failed to create order: {0}")]
    Persist(#[from] ServiceError),
}

impl IngestError {
    /// Classify this failure.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::Consume(ConsumeError::Transport(_)) => Disposition::Retry,
            Self::Consume(ConsumeError::Closed | ConsumeError::Broker(_)) => Disposition::Fatal,
            Self::Decode(_) | Self::Invalid(_) | Self::Persist(_) => Disposition::Skip,
        }
    }
}

/// Counters kept while the loop runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Messages read from the broker.
    pub received: u64,
    /// Orders persisted and cached.
    pub persisted: u64,
    /// Payloads that were not valid JSON orders.
    pub decode_failures: u64,
    /// Orders rejected by validation.
    pub validation_failures: u64,
    /// Orders the service failed to persist.
    pub persist_failures: u64,
    /// Transient broker errors that were retried.
    pub retries: u64,
}

impl IngestStats {
    fn record(&mut self, err: &IngestError) {
        match err {
            IngestError::Consume(_) => {}
            IngestError::Decode(_) => self.decode_failures += 1,
            IngestError::Invalid(_) => self.validation_failures += 1,
            IngestError::Persist(_) => self.persist_failures += 1,
        }
    }

    /// Messages dropped for any reason.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.decode_failures + self.validation_failures + self.persist_failures
    }
}

/// Exponential backoff between retried consume attempts.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    const fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Sequential consumer of the orders topic.
pub struct IngestionLoop {
    source: Arc<dyn MessageSource>,
    service: OrderService,
    shutdown: CancellationToken,
    backoff: Backoff,
    state: LoopState,
    stats: IngestStats,
}

impl IngestionLoop {
    /// Create a loop in the `Running` state.
    #[must_use]
    pub fn new(
        source: Arc<dyn MessageSource>,
        service: OrderService,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            service,
            shutdown,
            backoff: Backoff::new(INITIAL_RETRY_DELAY, MAX_RETRY_DELAY),
            state: LoopState::Running,
            stats: IngestStats::default(),
        }
    }

    /// Override the retry backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff = Backoff::new(initial, max);
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Consume until cancelled or until a fatal error.
    ///
    /// Cancellation is checked before every read and also interrupts a read
    /// that is waiting for the broker. A message already being processed is
    /// finished first.
    ///
    /// # Errors
    ///
    /// Returns the first failure classified as [`Disposition::Fatal`].
    pub async fn run(&mut self) -> Result<IngestStats, IngestError> {
        info!("Order ingestion started");

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(self.stop());
            }

            let consumed = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(self.stop()),
                consumed = self.source.consume() => consumed,
            };

            let result = match consumed {
                Ok(message) => {
                    self.backoff.reset();
                    self.stats.received += 1;
                    self.process(&message).await
                }
                Err(err) => Err(IngestError::from(err)),
            };

            let Err(err) = result else {
                self.stats.persisted += 1;
                continue;
            };

            self.stats.record(&err);
            match err.disposition() {
                Disposition::Skip => {
                    warn!(error = %err, "Message skipped");
                }
                Disposition::Retry => {
                    self.stats.retries += 1;
                    let delay = self.backoff.next_delay();
                    warn!(error = %err, retry_in_ms = delay.as_millis(), "Broker read failed, retrying");

                    tokio::select! {
                        () = self.shutdown.cancelled() => return Ok(self.stop()),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Disposition::Fatal => {
                    error!(error = %err, "Order ingestion aborted");
                    self.state = LoopState::Stopped;
                    return Err(err);
                }
            }
        }
    }

    /// Decode, validate and persist one message.
    async fn process(&self, message: &Message) -> Result<(), IngestError> {
        let order: Order = serde_json::from_slice(&message.payload)?;
        validate(&order)?;
        self.service.create_order(&order).await?;

        debug!(message = %message, order_uid = %order.order_uid, "Order ingested");
        Ok(())
    }

    fn stop(&mut self) -> IngestStats {
        self.state = LoopState::Stopped;
        info!(
            received = self.stats.received,
            persisted = self.stats.persisted,
            skipped = self.stats.skipped(),
            retries = self.stats.retries,
            "Order ingestion stopped"
        );
        self.stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orderflow_core::OrderUid;

    use super::*;
    use crate::broker::ChannelSource;
    use crate::cache::{MokaOrderCache, OrderCache};
    use crate::db::MemoryOrderStore;
    use crate::service::RefillPolicy;

    fn payload(uid: &str) -> String {
        serde_json::json!({
            "order_uid": uid,
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
                "transaction": uid,
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1_637_907_727,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [{
                "chrt_id": 9_934_930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2_389_212,
                "brand": "Vivienne Sabo",
                "status": 202
            }],
            "locale": "en",
            "customer_id": "test",
            "delivery_service": "meest",
            "shardkey": "9",
            "sm_id": 99,
            "date_created": "2021-11-26T06:22:19Z",
            "oof_shard": "1"
        })
        .to_string()
    }

    struct Harness {
        store: Arc<MemoryOrderStore>,
        cache: Arc<MokaOrderCache>,
        ingest: IngestionLoop,
        shutdown: CancellationToken,
    }

    fn harness(source: ChannelSource) -> Harness {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = Arc::new(MokaOrderCache::new(100));
        let service = OrderService::new(store.clone(), cache.clone(), RefillPolicy::OnMiss);
        let shutdown = CancellationToken::new();
        let ingest = IngestionLoop::new(Arc::new(source), service, shutdown.clone())
            .with_backoff(Duration::from_millis(1), Duration::from_millis(4));

        Harness {
            store,
            cache,
            ingest,
            shutdown,
        }
    }

    fn uid() -> String {
        OrderUid::new_v4().to_string()
    }

    #[tokio::test]
    async fn test_valid_message_is_persisted_and_cached() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        let id = uid();
        tx.send(payload(&id));
        drop(tx);

        // Source closes after the last message, which is fatal
        let err = h.ingest.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Consume(ConsumeError::Closed)));

        assert!(h.store.contains(OrderUid::parse(&id).unwrap()));
        assert!(h.cache.get(&id).is_some());
        assert_eq!(h.ingest.stats().persisted, 1);
        assert_eq!(h.ingest.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_stop_the_loop() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        let id = uid();
        tx.send("this is not json");
        tx.send(payload(&id));
        drop(tx);

        let _ = h.ingest.run().await;

        let stats = h.ingest.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.persisted, 1);
        assert!(h.store.contains(OrderUid::parse(&id).unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_uid_never_reaches_store() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        tx.send(payload(""));
        tx.send(payload("b563feb7-b2b8-4b6b-9b45-test"));
        drop(tx);

        let _ = h.ingest.run().await;

        assert_eq!(h.ingest.stats().validation_failures, 2);
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_is_skipped_and_not_cached() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        h.store.fail_writes(true);
        let id = uid();
        tx.send(payload(&id));
        drop(tx);

        let _ = h.ingest.run().await;

        assert_eq!(h.ingest.stats().persist_failures, 1);
        assert!(h.cache.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        let id = uid();
        tx.send_error(ConsumeError::Transport("all brokers down".to_string()));
        tx.send_error(ConsumeError::Transport("all brokers down".to_string()));
        tx.send(payload(&id));
        drop(tx);

        let _ = h.ingest.run().await;

        assert_eq!(h.ingest.stats().retries, 2);
        assert_eq!(h.ingest.stats().persisted, 1);
    }

    #[tokio::test]
    async fn test_broker_error_is_fatal() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        tx.send_error(ConsumeError::Broker("topic authorization failed".to_string()));
        tx.send(payload(&uid()));

        let err = h.ingest.run().await.unwrap_err();

        assert!(matches!(err, IngestError::Consume(ConsumeError::Broker(_))));
        assert_eq!(h.ingest.state(), LoopState::Stopped);
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start_returns_cleanly() {
        let (tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        tx.send(payload(&uid()));
        h.shutdown.cancel();

        let stats = h.ingest.run().await.unwrap();

        assert_eq!(stats.received, 0);
        assert_eq!(h.ingest.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_blocked_consume() {
        let (_tx, source) = ChannelSource::pair();
        let mut h = harness(source);
        let shutdown = h.shutdown.clone();

        let handle = tokio::spawn(async move {
            let result = h.ingest.run().await;
            (result, h.ingest.state())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        let (result, state) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(state, LoopState::Stopped);
    }

    #[test]
    fn test_disposition_table() {
        let transport = IngestError::Consume(ConsumeError::Transport("timeout".to_string()));
        let closed = IngestError::Consume(ConsumeError::Closed);
        let decode = IngestError::Decode(serde_json::from_str::<Order>("{").unwrap_err());

        assert_eq!(transport.disposition(), Disposition::Retry);
        assert_eq!(closed.disposition(), Disposition::Fatal);
        assert_eq!(decode.disposition(), Disposition::Skip);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}
