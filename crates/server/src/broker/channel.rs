//! Channel-backed message source for tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::{ConsumeError, Message, MessageSource};

const TOPIC: &str = "channel";

/// Feeds payloads (or consume errors) into a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Result<Vec<u8>, ConsumeError>>,
}

impl ChannelSender {
    /// Queue a payload. Returns `false` if the source is gone.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Ok(payload.into())).is_ok()
    }

    /// Queue a consume failure. Returns `false` if the source is gone.
    pub fn send_error(&self, error: ConsumeError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// Message source reading from an unbounded channel.
///
/// Once every [`ChannelSender`] is dropped and the queue is drained,
/// `consume` returns `ConsumeError::Closed`.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>, ConsumeError>>>,
    offset: AtomicI64,
}

impl ChannelSource {
    /// Create a connected sender/source pair.
    #[must_use]
    pub fn pair() -> (ChannelSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            rx: Mutex::new(rx),
            offset: AtomicI64::new(0),
        };
        (ChannelSender { tx }, source)
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn consume(&self) -> Result<Message, ConsumeError> {
        let next = self.rx.lock().await.recv().await;

        match next {
            Some(Ok(payload)) => Ok(Message {
                topic: TOPIC.to_string(),
                partition: 0,
                offset: self.offset.fetch_add(1, Ordering::SeqCst),
                payload,
            }),
            Some(Err(error)) => Err(error),
            None => Err(ConsumeError::Closed),
        }
    }

    fn close(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
        }
    }
}
