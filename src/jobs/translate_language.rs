use super::JobMetrics;
use crate::batching::{split_to_batches, BatchError};
use crate::config::Config;
use crate::models::language_code_is_valid;
use crate::queue::{MessageHandler, QueueMessage};
use crate::store::{ResourceStore, StoreError};
use crate::translation::{TranslateError, Translator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Request to translate every resource in `source_language` into `target_language`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslateLanguageMessage {
    pub source_language: String,
    pub target_language: String,
}

impl TranslateLanguageMessage {
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
        }
    }
}

impl QueueMessage for TranslateLanguageMessage {
    const TYPE: &'static str = "TranslateLanguage";
}

/// Optional upper bounds on individual provider and store calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobLimits {
    pub translate_timeout: Option<Duration>,
    pub storage_timeout: Option<Duration>,
}

impl JobLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            translate_timeout: config.translate_timeout,
            storage_timeout: config.storage_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Received,
    Validated,
    SourceLoaded,
    Batching,
    Translating,
    Persisting,
    Done,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Received => "received",
            JobStage::Validated => "validated",
            JobStage::SourceLoaded => "loading source resources",
            JobStage::Batching => "batching",
            JobStage::Translating => "translating",
            JobStage::Persisting => "persisting",
            JobStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid translation job: {0}")]
    Validation(String),

    #[error("no resources to translate for language '{0}'")]
    NoSourceResources(String),

    #[error("failed to batch resources: {0}")]
    Batching(#[from] BatchError),

    #[error("translation of batch {batch}/{batches} failed: {source}")]
    Translation {
        batch: usize,
        batches: usize,
        #[source]
        source: TranslateError,
    },

    #[error("storage failed while {stage}: {source}")]
    Storage {
        stage: JobStage,
        #[source]
        source: StoreError,
    },

    #[error("timed out after {limit:?} while {stage}")]
    Timeout { stage: JobStage, limit: Duration },

    #[error("failed to decode job payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Outcome of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub source_language: String,
    pub target_language: String,
    pub resources_read: usize,
    pub batches: usize,
    pub resources_written: u64,
}

/// Reasons a new-language job must not be queued
#[derive(Debug, Error)]
pub enum NewLanguageError {
    #[error("language code is invalid")]
    InvalidLanguage,

    #[error("target language already exists")]
    TargetExists,

    #[error("source language doesn't exist")]
    SourceMissing,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Check a job before it is queued: both codes valid, `target` absent from the
/// store and `source` present in it.
///
/// The handler upserts, so a job for a language that already exists would
/// overwrite its texts with machine output.
pub async fn ensure_new_language(
    store: &dyn ResourceStore,
    source: &str,
    target: &str,
) -> Result<(), NewLanguageError> {
    if !language_code_is_valid(source) || !language_code_is_valid(target) {
        return Err(NewLanguageError::InvalidLanguage);
    }

    let existing = store.existing_language_codes().await?;
    if existing.iter().any(|l| l.language_code == target) {
        return Err(NewLanguageError::TargetExists);
    }
    if !existing.iter().any(|l| l.language_code == source) {
        return Err(NewLanguageError::SourceMissing);
    }
    Ok(())
}

/// Translates all resources of one language into another.
///
/// Every batch is translated before anything is written; a failure in any batch
/// discards the whole job. Results are written with a single upsert, so handling
/// the same message twice leaves the store in the same state.
pub struct TranslateLanguageHandler {
    store: Arc<dyn ResourceStore>,
    translator: Arc<dyn Translator>,
    limits: JobLimits,
    metrics: Arc<JobMetrics>,
}

impl TranslateLanguageHandler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        translator: Arc<dyn Translator>,
        limits: JobLimits,
        metrics: Arc<JobMetrics>,
    ) -> Self {
        Self {
            store,
            translator,
            limits,
            metrics,
        }
    }

    pub async fn run(&self, message: &TranslateLanguageMessage) -> Result<JobReport, JobError> {
        let source = message.source_language.as_str();
        let target = message.target_language.as_str();
        debug!("Job {} -> {}: {}", source, target, JobStage::Received);

        validate(message)?;
        info!("Job {} -> {}: {}", source, target, JobStage::Validated);

        let resources = bounded(
            self.limits.storage_timeout,
            JobStage::SourceLoaded,
            self.store.get_by_language(source),
        )
        .await?
        .map_err(|e| storage_error(JobStage::SourceLoaded, e))?;

        if resources.is_empty() {
            return Err(JobError::NoSourceResources(source.to_string()));
        }
        info!(
            "Job {} -> {}: loaded {} source resources",
            source,
            target,
            resources.len()
        );

        let batches = split_to_batches(&resources, self.translator.batch_limit())?;
        let total = batches.len();
        info!(
            "Job {} -> {}: {} into {} batches of up to {} via {}",
            source,
            target,
            JobStage::Batching,
            total,
            self.translator.batch_limit(),
            self.translator.name()
        );

        let mut translated = Vec::with_capacity(resources.len());
        for (index, batch) in batches.into_iter().enumerate() {
            debug!(
                "Job {} -> {}: translating batch {}/{} ({} resources)",
                source,
                target,
                index + 1,
                total,
                batch.len()
            );

            let mut results = bounded(
                self.limits.translate_timeout,
                JobStage::Translating,
                self.translator.translate_resources(target, batch),
            )
            .await?
            .map_err(|e| JobError::Translation {
                batch: index + 1,
                batches: total,
                source: e,
            })?;
            translated.append(&mut results);
        }

        info!(
            "Job {} -> {}: {} ({} resources)",
            source,
            target,
            JobStage::Persisting,
            translated.len()
        );
        let written = bounded(
            self.limits.storage_timeout,
            JobStage::Persisting,
            self.store.upsert_resources(&translated),
        )
        .await?
        .map_err(|e| storage_error(JobStage::Persisting, e))?;

        info!("Job {} -> {}: {}", source, target, JobStage::Done);
        Ok(JobReport {
            source_language: source.to_string(),
            target_language: target.to_string(),
            resources_read: resources.len(),
            batches: total,
            resources_written: written,
        })
    }
}

#[async_trait]
impl MessageHandler for TranslateLanguageHandler {
    async fn handle_message(&self, payload: Map<String, Value>) -> anyhow::Result<()> {
        self.metrics.record_received();

        let decoded = serde_json::from_value::<TranslateLanguageMessage>(Value::Object(payload));
        let result = match decoded {
            Ok(message) => self.run(&message).await,
            Err(e) => Err(JobError::Decode(e)),
        };

        match result {
            Ok(report) => {
                info!(
                    "Translated {} resources from {} to {} in {} batches",
                    report.resources_written,
                    report.source_language,
                    report.target_language,
                    report.batches
                );
                self.metrics.record_success(&report);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e.into())
            }
        }
    }
}

fn validate(message: &TranslateLanguageMessage) -> Result<(), JobError> {
    let source = message.source_language.as_str();
    let target = message.target_language.as_str();

    if source.is_empty() || target.is_empty() {
        return Err(JobError::Validation(
            "source and target language are both required".to_string(),
        ));
    }
    for code in [source, target] {
        if !language_code_is_valid(code) {
            return Err(JobError::Validation(format!(
                "language code '{}' must be exactly 2 characters",
                code
            )));
        }
    }
    if source == target {
        return Err(JobError::Validation(format!(
            "source and target language are both '{}'",
            source
        )));
    }
    Ok(())
}

fn storage_error(stage: JobStage, source: StoreError) -> JobError {
    JobError::Storage { stage, source }
}

/// Await `future`, giving up after `limit` if one is set
async fn bounded<F: Future>(
    limit: Option<Duration>,
    stage: JobStage,
    future: F,
) -> Result<F::Output, JobError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| JobError::Timeout { stage, limit }),
        None => Ok(future.await),
    }
}
