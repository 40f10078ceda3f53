//! Machine translation providers.
//!
//! A [`Translator`] turns a list of texts into the same number of texts in the
//! target language, in the same order. Providers cap how many texts they accept
//! per call; callers split work with [`crate::batching::split_to_batches`] using
//! [`Translator::batch_limit`].

pub mod fake;
pub mod google;

use crate::config::{Config, TranslatorKind};
use crate::models::Resource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use fake::FakeTranslator;
pub use google::GoogleTranslator;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("there's a limit of {limit} resources per translation request but found {actual}")]
    BatchLimitExceeded { limit: usize, actual: usize },

    #[error("translation returned {actual} results for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("invalid target language '{0}'")]
    InvalidLanguage(String),

    #[error("translation API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to reach translation API: {0}")]
    Request(#[from] reqwest::Error),
}

impl TranslateError {
    /// 429, 5xx and transport failures are worth another attempt; everything
    /// else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslateError::Api { status, .. } => *status == 429 || *status >= 500,
            TranslateError::Request(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Maximum number of texts accepted by a single [`Translator::translate`] call
    fn batch_limit(&self) -> usize;

    /// Translate `texts` into `target_language`, returning one output per input
    async fn translate(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<String>, TranslateError>;

    /// Translate the text of each resource, keeping its key and switching its
    /// language code to `target_language`.
    async fn translate_resources(
        &self,
        target_language: &str,
        resources: &[Resource],
    ) -> Result<Vec<Resource>, TranslateError> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }

        let limit = self.batch_limit();
        if resources.len() > limit {
            return Err(TranslateError::BatchLimitExceeded {
                limit,
                actual: resources.len(),
            });
        }

        let texts: Vec<String> = resources.iter().map(|r| r.text.clone()).collect();
        let translations = self.translate(&texts, target_language).await?;

        if translations.len() != resources.len() {
            return Err(TranslateError::CountMismatch {
                expected: resources.len(),
                actual: translations.len(),
            });
        }

        Ok(resources
            .iter()
            .zip(translations)
            .map(|(resource, text)| Resource::new(&resource.key, target_language, text))
            .collect())
    }
}

/// Build the translator selected by configuration
pub fn from_config(config: &Config) -> Result<Arc<dyn Translator>> {
    let translator: Arc<dyn Translator> = match &config.translator {
        TranslatorKind::Google { api_key, api_url } => Arc::new(
            GoogleTranslator::new(api_url, api_key, Duration::from_secs(30))
                .context("Failed to build Google translation client")?,
        ),
        TranslatorKind::Fake { batch_limit } => Arc::new(FakeTranslator::new(*batch_limit)),
    };
    Ok(translator)
}
