//! Publish order payloads to the orders topic.
//!
//! # Usage
//!
//! ```bash
//! # Publish a file once, byte for byte
//! orderflow-cli send fixtures/order.json
//!
//! # Publish 50 distinct orders built from the same template
//! orderflow-cli send fixtures/order.json --count 50 --fresh-uid
//! ```
//!
//! Without `--fresh-uid` the file is sent unmodified, so malformed payloads
//! can be published on purpose.

use std::path::Path;

use orderflow_server::broker::{KafkaError, KafkaPublisher};
use orderflow_server::config::{ConfigError, KafkaConfig};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("--fresh-uid needs a JSON object payload: {0}")]
    Template(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
}

/// Publish `file` to the configured topic `count` times.
///
/// # Errors
///
/// Returns `SendError` if the file cannot be read, the template cannot be
/// rewritten, or the broker rejects a message.
pub async fn run(file: &Path, count: u32, fresh_uid: bool) -> Result<(), SendError> {
    let raw = std::fs::read(file).map_err(|source| SendError::Read {
        path: file.display().to_string(),
        source,
    })?;

    let template = if fresh_uid {
        Some(serde_json::from_slice::<Value>(&raw).map_err(|e| SendError::Template(e.to_string()))?)
    } else {
        None
    };

    let config = KafkaConfig::from_env()?;
    let publisher = KafkaPublisher::new(&config)?;

    for n in 1..=count {
        let (key, payload) = match &template {
            Some(template) => {
                let (order, uid) = with_fresh_uid(template, Uuid::new_v4())?;
                (Some(uid), order.to_string().into_bytes())
            }
            None => (None, raw.clone()),
        };

        publisher.publish(key.as_deref(), &payload).await?;
        info!(n, count, order_uid = key.as_deref().unwrap_or("-"), topic = %config.topic, "Published");
    }

    info!(count, "Done");
    Ok(())
}

/// Copy `template` with `order_uid` and `payment.transaction` set to `uid`.
fn with_fresh_uid(template: &Value, uid: Uuid) -> Result<(Value, String), SendError> {
    let uid = uid.to_string();
    let mut order = template.clone();

    let Some(fields) = order.as_object_mut() else {
        return Err(SendError::Template("top level is not an object".to_string()));
    };
    fields.insert("order_uid".to_string(), Value::String(uid.clone()));

    if let Some(payment) = fields.get_mut("payment").and_then(Value::as_object_mut) {
        payment.insert("transaction".to_string(), Value::String(uid.clone()));
    }

    Ok((order, uid))
}
