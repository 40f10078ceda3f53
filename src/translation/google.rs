use super::{TranslateError, Translator};
use crate::models::language_code_is_valid;
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// Texts per request. The API rejects more than 128 `q` values.
pub const GOOGLE_BATCH_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
struct TranslationRequest<'a> {
    q: &'a [String],
    target: &'a str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslationResponse {
    data: TranslationData,
}

#[derive(Debug, Deserialize)]
struct TranslationData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

/// Client for the Cloud Translation v2 REST API
pub struct GoogleTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl GoogleTranslator {
    /// `request_timeout` bounds each HTTP attempt, not the retried call as a whole
    pub fn new(
        api_url: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            retry: RetryConfig::translation_call(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send(&self, request: &TranslationRequest<'_>) -> Result<Vec<String>, TranslateError> {
        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(TranslateError::Api { status, body });
        }

        let parsed: TranslationResponse = response.json().await?;
        Ok(parsed
            .data
            .translations
            .into_iter()
            .map(|t| t.translated_text)
            .collect())
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn name(&self) -> &'static str {
        "google"
    }

    fn batch_limit(&self) -> usize {
        GOOGLE_BATCH_LIMIT
    }

    async fn translate(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<String>, TranslateError> {
        if !language_code_is_valid(target_language) {
            return Err(TranslateError::InvalidLanguage(target_language.to_string()));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = TranslationRequest {
            q: texts,
            target: target_language,
            format: "text",
        };
        debug!("Translating {} texts to {}", texts.len(), target_language);

        with_retry_if(
            &self.retry,
            &format!("Translation to {}", target_language),
            || self.send(&request),
            TranslateError::is_retryable,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use wiremock::{
        matchers::{body_json, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const TEST_PATH: &str = "/language/translate/v2";

    fn create_test_translator(server: &MockServer) -> GoogleTranslator {
        GoogleTranslator::new(
            &format!("{}{}", server.uri(), TEST_PATH),
            "test-google-key",
            Duration::from_secs(5),
        )
        .expect("Should build client")
        .with_retry(RetryConfig::new(3, Duration::from_millis(5)))
    }

    fn create_google_response(texts: &[&str]) -> serde_json::Value {
        let translations: Vec<_> = texts
            .iter()
            .map(|t| serde_json::json!({ "translatedText": t, "detectedSourceLanguage": "en" }))
            .collect();
        serde_json::json!({ "data": { "translations": translations } })
    }

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    // ==================== Request Shape Tests ====================

    #[test]
    fn test_request_serializes_v2_body() {
        let q = texts(&["Hello", "World"]);
        let request = TranslationRequest {
            q: &q,
            target: "fi",
            format: "text",
        };

        assert_eq!(
            serde_json::to_value(&request).expect("Should serialize"),
            serde_json::json!({ "q": ["Hello", "World"], "target": "fi", "format": "text" })
        );
    }

    #[test]
    fn test_batch_limit_below_provider_maximum() {
        let translator = GoogleTranslator::new(DEFAULT_API_URL, "k", Duration::from_secs(1))
            .expect("Should build client");
        assert_eq!(translator.batch_limit(), 100);
        assert!(translator.batch_limit() <= 128);
    }

    // ==================== Integration Tests with Wiremock ====================

    #[tokio::test]
    async fn test_translate_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .and(query_param("key", "test-google-key"))
            .and(body_json(serde_json::json!({
                "q": ["Hello", "Goodbye"],
                "target": "es",
                "format": "text"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_google_response(&["Hola", "Adiós"])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator
            .translate(&texts(&["Hello", "Goodbye"]), "es")
            .await
            .expect("Should succeed");

        assert_eq!(result, vec!["Hola", "Adiós"]);
    }

    #[tokio::test]
    async fn test_translate_resources_through_google() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_google_response(&["Hei"])),
            )
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator
            .translate_resources("fi", &[Resource::new("greeting", "en", "Hi")])
            .await
            .expect("Should succeed");

        assert_eq!(result, vec![Resource::new("greeting", "fi", "Hei")]);
    }

    #[tokio::test]
    async fn test_translate_short_response_is_count_mismatch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_google_response(&["Yksi"])),
            )
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator
            .translate_resources(
                "fi",
                &[Resource::new("k1", "en", "one"), Resource::new("k2", "en", "two")],
            )
            .await;

        assert!(matches!(
            result,
            Err(TranslateError::CountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn test_translate_server_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator.translate(&texts(&["Hello"]), "es").await;

        match result {
            Err(TranslateError::Api { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("Internal Server Error"));
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_translate_client_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid Value"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator.translate(&texts(&["Hello"]), "es").await;

        assert!(matches!(result, Err(TranslateError::Api { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_translate_recovers_after_rate_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_google_response(&["Hallo"])),
            )
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator
            .translate(&texts(&["Hello"]), "de")
            .await
            .expect("Should succeed after retry");

        assert_eq!(result, vec!["Hallo"]);
    }

    #[tokio::test]
    async fn test_translate_rejects_invalid_target_without_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator.translate(&texts(&["Hello"]), "spanish").await;

        assert!(matches!(result, Err(TranslateError::InvalidLanguage(code)) if code == "spanish"));
    }

    #[tokio::test]
    async fn test_translate_malformed_body_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TEST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator.translate(&texts(&["Hello"]), "es").await;

        assert!(matches!(result, Err(TranslateError::Request(e)) if e.is_decode()));
    }
}
