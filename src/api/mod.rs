//! HTTP API over the resource store and the translation queue.
//!
//! Successful responses wrap their payload as `{"data": ...}`; failures return
//! `{"errors": ["..."]}` with an appropriate status.

pub mod resources;
pub mod translations;
pub mod validation;

use crate::jobs::JobMetrics;
use crate::queue::QueueTransport;
use crate::security::{api_key_authorized, API_KEY_HEADER};
use crate::store::{ResourceStore, StoreError};
use crate::translation::Translator;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub translator: Arc<dyn Translator>,
    pub queue: Arc<dyn QueueTransport>,
    pub metrics: Arc<JobMetrics>,
    pub api_key: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/metrics", get(metrics))
        .route(
            "/resources",
            get(resources::get_resources)
                .post(resources::add_resources)
                .put(resources::update_resources)
                .delete(resources::delete_resources),
        )
        .route("/resources/languages", get(resources::get_languages))
        .route("/translations", get(translations::translate_resource))
        .route(
            "/translations/:source/to/:target",
            post(translations::translate_all_to_new_language),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> Json<Data<crate::jobs::MetricsReport>> {
    Json(Data::new(state.metrics.report()))
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !api_key_authorized(state.api_key.as_deref(), provided) {
        warn!(
            "Rejected {} {}: missing or invalid API key",
            request.method(),
            request.uri().path()
        );
        return ApiError::new(StatusCode::UNAUTHORIZED, "missing or invalid API key")
            .into_response();
    }

    next.run(request).await
}

/// `{"data": ...}` envelope
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Error response rendered as `{"errors": [...]}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    messages: Vec<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            messages: vec![message.into()],
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn with_messages(status: StatusCode, messages: Vec<String>) -> Self {
        Self { status, messages }
    }

    /// Map a store failure to a response; unexpected ones are logged with `context`
    pub fn from_store(err: StoreError, context: &str) -> Self {
        match err {
            StoreError::NoResources | StoreError::NoFilter => Self::bad_request(err.to_string()),
            StoreError::AlreadyExists { .. }
            | StoreError::DuplicateInput { .. }
            | StoreError::Conflict => Self::new(StatusCode::CONFLICT, err.to_string()),
            StoreError::NotImplemented { .. } => {
                Self::new(StatusCode::NOT_IMPLEMENTED, err.to_string())
            }
            other => {
                error!("{}: {}", context, other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, context)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "errors": self.messages }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::store::MemoryStore;
    use crate::translation::FakeTranslator;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn test_state(api_key: Option<&str>) -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            translator: Arc::new(FakeTranslator::default()),
            queue: Arc::new(MemoryQueue::new()),
            metrics: Arc::new(JobMetrics::new()),
            api_key: api_key.map(Arc::from),
        }
    }

    async fn status_of(app: Router, uri: &str, key: Option<&str>) -> StatusCode {
        let mut request = HttpRequest::builder().uri(uri);
        if let Some(key) = key {
            request = request.header("X-API-Key", key);
        }
        app.oneshot(request.body(Body::empty()).expect("Should build request"))
            .await
            .expect("Should respond")
            .status()
    }

    // ==================== Auth Tests ====================

    #[tokio::test]
    async fn test_health_is_public() {
        let app = router(test_state(Some("secret")));
        assert_eq!(status_of(app, "/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_key() {
        let state = test_state(Some("secret"));

        assert_eq!(
            status_of(router(state.clone()), "/resources/languages", None).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(router(state.clone()), "/resources/languages", Some("wrong")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(router(state), "/resources/languages", Some("secret")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_no_key_configured_allows_all() {
        let app = router(test_state(None));
        assert_eq!(status_of(app, "/metrics", None).await, StatusCode::OK);
    }

    // ==================== Error Mapping Tests ====================

    #[test]
    fn test_store_error_status_mapping() {
        let status = |err| ApiError::from_store(err, "ctx").status();

        assert_eq!(status(StoreError::NoResources), StatusCode::BAD_REQUEST);
        assert_eq!(status(StoreError::AlreadyExists { count: 2 }), StatusCode::CONFLICT);
        assert_eq!(status(StoreError::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status(StoreError::NotImplemented {
                backend: "file",
                operation: "update"
            }),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            status(StoreError::Io(std::io::Error::other("disk gone"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
