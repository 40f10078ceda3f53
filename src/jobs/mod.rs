//! Queue message handlers.

pub mod metrics;
pub mod translate_language;

use crate::queue::{HandlerMap, MessageHandler, QueueMessage};
use crate::store::ResourceStore;
use crate::translation::Translator;
use std::sync::Arc;

pub use metrics::{JobMetrics, MetricsReport};
pub use translate_language::{
    ensure_new_language, JobError, JobLimits, JobReport, JobStage, NewLanguageError,
    TranslateLanguageHandler, TranslateLanguageMessage,
};

/// Every handler this service consumes, keyed by message type
pub fn message_handlers(
    store: Arc<dyn ResourceStore>,
    translator: Arc<dyn Translator>,
    limits: JobLimits,
    metrics: Arc<JobMetrics>,
) -> HandlerMap {
    let mut handlers = HandlerMap::new();
    handlers.insert(
        TranslateLanguageMessage::TYPE.to_string(),
        Arc::new(TranslateLanguageHandler::new(store, translator, limits, metrics))
            as Arc<dyn MessageHandler>,
    );
    handlers
}
