//! Message queue transport.
//!
//! Messages travel as JSON objects carrying a `"type"` tag. A consumer decodes each
//! body, looks the tag up in a [`HandlerMap`] and hands the payload to the matching
//! [`MessageHandler`]. Undecodable or unroutable bodies and handler failures are
//! logged and dropped: there is no redelivery on handler error and no dead-letter
//! queue.

pub mod memory;
pub mod postgres;

use crate::config::{Config, QueueKind};
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub use memory::MemoryQueue;
pub use postgres::PostgresQueue;

/// Field that carries the message type tag
pub const TYPE_FIELD: &str = "type";

/// A message that can be published. `TYPE` becomes the dispatch tag.
pub trait QueueMessage: Serialize {
    const TYPE: &'static str;
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{message_type} message must serialize to a JSON object")]
    NotAnObject { message_type: &'static str },

    #[error("queue is closed")]
    Closed,

    #[error("queue already has a consumer")]
    AlreadyConsuming,

    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Serialize `message` and add its type tag
pub fn encode_message<M: QueueMessage>(message: &M) -> Result<Vec<u8>, QueueError> {
    let mut value = serde_json::to_value(message)?;
    let object = value.as_object_mut().ok_or(QueueError::NotAnObject {
        message_type: M::TYPE,
    })?;
    object.insert(TYPE_FIELD.to_string(), Value::String(M::TYPE.to_string()));
    Ok(serde_json::to_vec(&value)?)
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one decoded message. The payload still contains the type tag.
    async fn handle_message(&self, payload: Map<String, Value>) -> anyhow::Result<()>;
}

/// Type tag to handler
pub type HandlerMap = HashMap<String, Arc<dyn MessageHandler>>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to decode message body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("message has no '{}' field", TYPE_FIELD)]
    MissingType,

    #[error("message type must be a string, got {0}")]
    InvalidType(Value),

    #[error("no handler registered for message type '{0}'")]
    UnknownType(String),

    #[error("handler for '{message_type}' failed: {error:#}")]
    Handler {
        message_type: String,
        error: anyhow::Error,
    },
}

/// Route one raw message body to its handler. Returns the type tag on success.
pub async fn dispatch(handlers: &HandlerMap, body: &[u8]) -> Result<String, DispatchError> {
    let payload: Map<String, Value> = serde_json::from_slice(body)?;

    let message_type = match payload.get(TYPE_FIELD) {
        None => return Err(DispatchError::MissingType),
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => return Err(DispatchError::InvalidType(other.clone())),
    };

    let handler = handlers
        .get(&message_type)
        .ok_or_else(|| DispatchError::UnknownType(message_type.clone()))?;

    handler
        .handle_message(payload)
        .await
        .map_err(|error| DispatchError::Handler {
            message_type: message_type.clone(),
            error,
        })?;

    Ok(message_type)
}

/// [`dispatch`] for consumer loops: every failure is logged, none escapes.
/// Returns true if a handler ran to completion.
pub async fn deliver(handlers: &HandlerMap, body: &[u8]) -> bool {
    match dispatch(handlers, body).await {
        Ok(message_type) => {
            debug!("Handled {} message", message_type);
            true
        }
        Err(e @ DispatchError::Handler { .. }) => {
            error!("{}", e);
            false
        }
        Err(e) => {
            warn!("Dropping undeliverable message: {}", e);
            false
        }
    }
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &'static str;

    /// Enqueue an already encoded message body
    async fn publish_bytes(&self, body: Vec<u8>) -> Result<(), QueueError>;

    /// Start the long-lived consumer task. It stops when `shutdown` is cancelled
    /// or the transport is closed.
    async fn consume(
        &self,
        handlers: HandlerMap,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, QueueError>;

    /// Stop accepting messages and let the consumer wind down
    async fn close(&self) -> Result<(), QueueError>;
}

#[async_trait]
pub trait QueueTransportExt {
    async fn publish<M>(&self, message: &M) -> Result<(), QueueError>
    where
        M: QueueMessage + Sync;
}

#[async_trait]
impl<T> QueueTransportExt for T
where
    T: QueueTransport + ?Sized,
{
    async fn publish<M>(&self, message: &M) -> Result<(), QueueError>
    where
        M: QueueMessage + Sync,
    {
        let body = encode_message(message)?;
        self.publish_bytes(body).await
    }
}

/// Build the queue selected by configuration, creating its table if needed
pub async fn from_config(
    config: &Config,
    pool: Option<PgPool>,
) -> anyhow::Result<Arc<dyn QueueTransport>> {
    let queue: Arc<dyn QueueTransport> = match &config.queue {
        QueueKind::Memory => Arc::new(MemoryQueue::new()),
        QueueKind::Postgres {
            name,
            poll_interval,
        } => {
            let queue = PostgresQueue::new(
                pool.context("postgres queue requires a database pool")?,
                name,
                *poll_interval,
            );
            queue
                .init()
                .await
                .context("Failed to prepare queue_messages table")?;
            Arc::new(queue)
        }
    };
    Ok(queue)
}
