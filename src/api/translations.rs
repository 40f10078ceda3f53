use super::{ApiError, AppState, Data};
use crate::jobs::{ensure_new_language, NewLanguageError, TranslateLanguageMessage};
use crate::models::{language_code_is_valid, Resource};
use crate::queue::QueueTransportExt;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslateQuery {
    pub key: String,
    pub text: String,
    pub target_language: String,
}

/// `GET /translations?key=k&text=Hello&targetLanguage=fi`: translate one text
/// without storing it
pub async fn translate_resource(
    State(state): State<AppState>,
    Query(query): Query<TranslateQuery>,
) -> Result<Json<Data<Vec<Resource>>>, ApiError> {
    if query.key.is_empty()
        || query.text.is_empty()
        || !language_code_is_valid(&query.target_language)
    {
        return Err(ApiError::bad_request("invalid input"));
    }

    let mut translations = state
        .translator
        .translate(&[query.text], &query.target_language)
        .await
        .map_err(|e| {
            error!("Single translation failed: {}", e);
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                format!("there was a problem with the translation service: {}", e),
            )
        })?;

    if translations.len() != 1 {
        return Err(ApiError::new(
            StatusCode::BAD_GATEWAY,
            format!(
                "expected 1 result from translation service but found {}",
                translations.len()
            ),
        ));
    }

    let text = translations.remove(0);
    Ok(Json(Data::new(vec![Resource::new(
        query.key,
        query.target_language,
        text,
    )])))
}

/// `POST /translations/{source}/to/{target}`: queue a job translating every
/// resource of `source` into the not yet existing `target`
pub async fn translate_all_to_new_language(
    State(state): State<AppState>,
    Path((source, target)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    ensure_new_language(state.store.as_ref(), &source, &target)
        .await
        .map_err(|e| match e {
            NewLanguageError::Store(e) => {
                ApiError::from_store(e, "there was a problem retrieving existing languages")
            }
            other => ApiError::bad_request(other.to_string()),
        })?;

    state
        .queue
        .publish(&TranslateLanguageMessage::new(&source, &target))
        .await
        .map_err(|e| {
            error!("Failed to publish translation job {} -> {}: {}", source, target, e);
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "something went wrong while starting the translation",
            )
        })?;

    info!("Queued translation job {} -> {} on {} queue", source, target, state.queue.name());
    Ok(StatusCode::ACCEPTED)
}
