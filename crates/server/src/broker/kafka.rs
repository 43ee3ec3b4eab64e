//! Kafka transport via `rdkafka`.
//!
//! The consumer joins `KAFKA_GROUP_ID` and auto-commits offsets as messages
//! are handed to the application, which gives at-most-once processing: a
//! message whose processing fails is not redelivered.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
pub use rdkafka::error::KafkaError;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{info, warn};

use super::{ConsumeError, Message, MessageSource};
use crate::config::KafkaConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer subscribed to the orders topic.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSource {
    /// Create a consumer and subscribe it to the configured topic.
    ///
    /// # Errors
    ///
    /// Returns `KafkaError` if the client cannot be created or the
    /// subscription is rejected.
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;
        info!(
            brokers = %config.bootstrap_servers(),
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn consume(&self) -> Result<Message, ConsumeError> {
        let message = self.consumer.recv().await.map_err(convert_error)?;

        Ok(Message {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    fn close(&self) {
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "Kafka consumer unsubscribed");
    }
}

/// Sort librdkafka errors into transient and permanent ones.
fn convert_error(err: KafkaError) -> ConsumeError {
    match err.rdkafka_error_code() {
        Some(code) if is_transient(code) => ConsumeError::Transport(err.to_string()),
        _ if matches!(err, KafkaError::Canceled) => ConsumeError::Closed,
        _ => ConsumeError::Broker(err.to_string()),
    }
}

const fn is_transient(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::CoordinatorNotAvailable
            | RDKafkaErrorCode::NotCoordinator
            | RDKafkaErrorCode::RebalanceInProgress
            | RDKafkaErrorCode::PartitionEOF
    )
}

/// Producer publishing raw payloads to one topic.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    /// Create a producer for the configured topic.
    ///
    /// # Errors
    ///
    /// Returns `KafkaError` if the client cannot be created.
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    /// Publish one payload, optionally keyed, and wait for the broker ack.
    ///
    /// # Errors
    ///
    /// Returns `KafkaError` if delivery fails or times out.
    pub async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<(), KafkaError> {
        let mut record = FutureRecord::<str, [u8]>::to(&self.topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(err, _)| {
                warn!(error = %err, topic = %self.topic, "Kafka delivery failed");
                err
            })
    }
}
