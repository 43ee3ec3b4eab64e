//! Message broker boundary.
//!
//! The ingestion loop reads raw payloads through [`MessageSource`] and knows
//! nothing about the transport behind it.
//!
//! - [`kafka`] - `rdkafka` consumer and producer (feature `kafka`)
//! - [`channel`] - in-process source fed by a channel (feature `test-support`)

#[cfg(any(test, feature = "test-support"))]
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

use core::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
pub use channel::{ChannelSender, ChannelSource};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaError, KafkaPublisher, KafkaSource};

/// A raw message read from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// Failure to read from the broker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsumeError {
    /// A transient transport problem (broker down, timeout, rebalance).
    #[error("broker transport error: {0}")]
    Transport(String),

    /// The source is closed and will never yield another message.
    #[error("message source closed")]
    Closed,

    /// A non-recoverable broker error (authorization, unknown topic, config).
    #[error("broker error: {0}")]
    Broker(String),
}

/// Source of raw order payloads.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message.
    async fn consume(&self) -> Result<Message, ConsumeError>;

    /// Release broker resources. Called once, after the last `consume`.
    fn close(&self) {}
}
