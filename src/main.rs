use anyhow::{Context, Result};
use resource_translator::{
    api::{self, AppState},
    config::Config,
    connect_database,
    jobs::{self, JobLimits, JobMetrics},
    queue, store, translation,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resource_translator=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    info!("Starting resource translator ({})", config.environment);

    let pool = connect_database(&config).await?;

    let store = store::from_config(&config, pool.clone())?;
    store
        .init()
        .await
        .with_context(|| format!("Failed to initialize {} store", store.backend()))?;
    info!("Using {} resource store", store.backend());

    let translator = translation::from_config(&config)?;
    info!(
        "Using {} translator (batch limit {})",
        translator.name(),
        translator.batch_limit()
    );

    let queue = queue::from_config(&config, pool.clone()).await?;
    let metrics = Arc::new(JobMetrics::new());

    let shutdown = CancellationToken::new();
    let handlers = jobs::message_handlers(
        store.clone(),
        translator.clone(),
        JobLimits::from_config(&config),
        metrics.clone(),
    );
    let consumer = queue
        .consume(handlers, shutdown.clone())
        .await
        .context("Failed to start queue consumer")?;
    info!("Consuming translation jobs from {} queue", queue.name());

    let app = api::router(AppState {
        store,
        translator,
        queue: queue.clone(),
        metrics,
        api_key: config.api_key.as_deref().map(Arc::from),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down queue consumer");
    shutdown.cancel();
    if let Err(e) = queue.close().await {
        error!("Failed to close queue: {}", e);
    }
    if let Err(e) = consumer.await {
        error!("Queue consumer task failed: {}", e);
    }
    if let Some(pool) = pool {
        pool.close().await;
    }

    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
