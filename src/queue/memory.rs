use super::{deliver, HandlerMap, QueueError, QueueTransport};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process queue over a bounded tokio channel. Single consumer; messages are
/// lost if the process exits before they are handled.
pub struct MemoryQueue {
    sender: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    receiver: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish_bytes(&self, body: Vec<u8>) -> Result<(), QueueError> {
        let sender = self.sender.lock().await.clone().ok_or(QueueError::Closed)?;
        sender.send(body).await.map_err(|_| QueueError::Closed)
    }

    async fn consume(
        &self,
        handlers: HandlerMap,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, QueueError> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyConsuming)?;

        Ok(tokio::spawn(async move {
            info!("Memory queue consumer started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Memory queue consumer cancelled");
                        break;
                    }
                    message = receiver.recv() => match message {
                        Some(body) => {
                            deliver(&handlers, &body).await;
                        }
                        None => {
                            info!("Memory queue closed and drained");
                            break;
                        }
                    }
                }
            }
        }))
    }

    async fn close(&self) -> Result<(), QueueError> {
        // Dropping the last sender lets the consumer drain what is buffered and exit
        self.sender.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MessageHandler, QueueMessage, QueueTransportExt};
    use serde::Serialize;
    use serde_json::{Map, Value};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Serialize)]
    struct Note {
        n: u32,
    }

    impl QueueMessage for Note {
        const TYPE: &'static str = "Note";
    }

    struct Recorder {
        seen: std::sync::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_message(&self, payload: Map<String, Value>) -> anyhow::Result<()> {
            let n = payload.get("n").and_then(Value::as_u64).unwrap_or_default();
            if n == 2 {
                anyhow::bail!("refusing note 2");
            }
            self.seen.lock().unwrap().push(n);
            Ok(())
        }
    }

    fn recorder_handlers() -> (Arc<Recorder>, HandlerMap) {
        let recorder = Arc::new(Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let mut handlers = HandlerMap::new();
        handlers.insert("Note".to_string(), recorder.clone() as Arc<dyn MessageHandler>);
        (recorder, handlers)
    }

    #[tokio::test]
    async fn test_consumer_survives_bad_messages_and_drains_on_close() {
        let queue = MemoryQueue::new();
        let (recorder, handlers) = recorder_handlers();

        let consumer = queue
            .consume(handlers, CancellationToken::new())
            .await
            .expect("Should start consumer");

        queue.publish(&Note { n: 1 }).await.expect("publish");
        queue.publish_bytes(b"garbage".to_vec()).await.expect("publish");
        queue.publish_bytes(br#"{"type":"Unknown"}"#.to_vec()).await.expect("publish");
        queue.publish(&Note { n: 2 }).await.expect("publish");
        queue.publish(&Note { n: 3 }).await.expect("publish");
        queue.close().await.expect("close");

        tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("Consumer should stop after close")
            .expect("Consumer should not panic");

        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let queue = MemoryQueue::new();
        queue.close().await.expect("close");

        let result = queue.publish(&Note { n: 1 }).await;
        assert!(matches!(result, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn test_single_consumer_only() {
        let queue = MemoryQueue::new();
        let token = CancellationToken::new();
        let (_, handlers) = recorder_handlers();

        let consumer = queue
            .consume(handlers.clone(), token.clone())
            .await
            .expect("First consumer");
        let second = queue.consume(handlers, token.clone()).await;
        assert!(matches!(second, Err(QueueError::AlreadyConsuming)));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("Consumer should stop on cancel")
            .expect("Consumer should not panic");
    }
}
