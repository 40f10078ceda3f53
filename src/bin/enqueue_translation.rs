//! Publish a single "translate language" job to the configured queue.
//!
//! Usage:
//!   cargo run --bin enqueue-translation -- en fi
//!
//! Uses the same environment as the service (PERSISTENCE, QUEUE, QUEUE_NAME,
//! DATABASE_URL). The job is refused when the target language already has
//! resources or the source language has none.
//! Only the Postgres queue reaches a running service; with QUEUE=memory the job
//! lives and dies with this process.

use anyhow::{bail, Context, Result};
use resource_translator::{
    config::{Config, QueueKind},
    connect_database,
    jobs::{ensure_new_language, TranslateLanguageMessage},
    queue::{self, QueueTransportExt},
    store,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resource_translator=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [source, target] = args.as_slice() else {
        bail!("usage: enqueue-translation <source-language> <target-language>");
    };

    let config = Config::from_env()?;
    if config.queue == QueueKind::Memory {
        warn!("QUEUE=memory: no other process will see this job");
    }

    let pool = connect_database(&config).await?;
    let store = store::from_config(&config, pool.clone())?;
    store
        .init()
        .await
        .with_context(|| format!("Failed to initialize {} store", store.backend()))?;

    ensure_new_language(store.as_ref(), source, target)
        .await
        .with_context(|| format!("Cannot translate {} -> {}", source, target))?;

    let queue = queue::from_config(&config, pool).await?;

    queue
        .publish(&TranslateLanguageMessage::new(source, target))
        .await
        .context("Failed to publish translation job")?;
    queue.close().await?;

    info!("Queued translation {} -> {} on {} queue", source, target, queue.name());
    Ok(())
}
