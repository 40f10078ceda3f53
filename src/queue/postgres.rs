use super::{deliver, HandlerMap, QueueError, QueueTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CREATE_QUEUE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS queue_messages (
        id BIGSERIAL PRIMARY KEY,
        queue TEXT NOT NULL,
        body BYTEA NOT NULL,
        enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const CREATE_QUEUE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS queue_messages_queue_id_idx ON queue_messages (queue, id)";

/// Oldest message first; rows held by another consumer's transaction are skipped.
const CLAIM_NEXT: &str = r#"
    SELECT id, body, enqueued_at
    FROM queue_messages
    WHERE queue = $1
    ORDER BY id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
"#;

#[derive(Debug, sqlx::FromRow)]
struct QueuedMessage {
    id: i64,
    body: Vec<u8>,
    enqueued_at: DateTime<Utc>,
}

/// Durable queue stored in a Postgres table.
///
/// A message row stays locked for as long as its handler runs and is deleted in
/// the same transaction afterwards, so a crash mid-handling puts it back on the
/// queue (at-least-once). Handler failures still delete the row.
#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
    name: String,
    poll_interval: Duration,
    closed: CancellationToken,
}

impl PostgresQueue {
    pub fn new(pool: PgPool, name: &str, poll_interval: Duration) -> Self {
        Self {
            pool,
            name: name.to_string(),
            poll_interval,
            closed: CancellationToken::new(),
        }
    }

    pub async fn init(&self) -> Result<(), QueueError> {
        sqlx::query(CREATE_QUEUE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_QUEUE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Messages waiting on this queue, including ones currently being handled
    pub async fn pending(&self) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue = $1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Claim, handle and delete one message. Returns false if the queue was empty.
    async fn receive_one(&self, handlers: &HandlerMap) -> Result<bool, QueueError> {
        let mut tx = self.pool.begin().await?;

        let message: Option<QueuedMessage> = sqlx::query_as(CLAIM_NEXT)
            .bind(&self.name)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(message) = message else {
            tx.rollback().await?;
            return Ok(false);
        };

        let waited = Utc::now().signed_duration_since(message.enqueued_at);
        debug!(
            "Claimed message {} from '{}' after {}ms in queue",
            message.id,
            self.name,
            waited.num_milliseconds()
        );

        deliver(handlers, &message.body).await;

        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(message.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn run(self, handlers: HandlerMap, shutdown: CancellationToken) {
        info!(
            "Postgres queue consumer started on '{}' (poll every {:?})",
            self.name, self.poll_interval
        );

        while !shutdown.is_cancelled() && !self.closed.is_cancelled() {
            let idle = match self.receive_one(&handlers).await {
                Ok(handled) => !handled,
                Err(e) => {
                    error!("Queue '{}' poll failed: {}", self.name, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.closed.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!("Postgres queue consumer on '{}' stopped", self.name);
    }
}

#[async_trait]
impl QueueTransport for PostgresQueue {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn publish_bytes(&self, body: Vec<u8>) -> Result<(), QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }

        sqlx::query("INSERT INTO queue_messages (queue, body) VALUES ($1, $2)")
            .bind(&self.name)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        handlers: HandlerMap,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }
        Ok(tokio::spawn(self.clone().run(handlers, shutdown)))
    }

    async fn close(&self) -> Result<(), QueueError> {
        // The pool is shared with the resource store and is closed by its owner
        self.closed.cancel();
        Ok(())
    }
}
