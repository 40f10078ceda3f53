use super::{TranslateError, Translator};
use async_trait::async_trait;

pub const DEFAULT_FAKE_BATCH_LIMIT: usize = 5;

/// Deterministic offline translator: `"Hello"` to `fi` becomes `"[fi] Hello"`.
///
/// The small default batch limit makes multi-batch jobs easy to exercise locally.
#[derive(Debug, Clone)]
pub struct FakeTranslator {
    batch_limit: usize,
}

impl FakeTranslator {
    pub fn new(batch_limit: usize) -> Self {
        Self { batch_limit }
    }
}

impl Default for FakeTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_FAKE_BATCH_LIMIT)
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    async fn translate(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<String>, TranslateError> {
        if texts.len() > self.batch_limit {
            return Err(TranslateError::BatchLimitExceeded {
                limit: self.batch_limit,
                actual: texts.len(),
            });
        }

        Ok(texts
            .iter()
            .map(|text| format!("[{}] {}", target_language, text))
            .collect())
    }
}
