use super::validation::{
    parse_resources, validate_resource_data, validate_search_filter, SearchFilter,
};
use super::{ApiError, AppState, Data};
use crate::models::{language_code_is_valid, LanguageSummary, Resource};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    #[serde(rename = "languagecode")]
    pub language_code: Option<String>,
    pub key: Option<String>,
}

/// `GET /resources?languagecode=xx` or `GET /resources?key=k`
pub async fn get_resources(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> Result<Json<Data<Vec<Resource>>>, ApiError> {
    let filter = validate_search_filter(query.language_code.as_deref(), query.key.as_deref())
        .map_err(ApiError::bad_request)?;

    let resources = match &filter {
        SearchFilter::Language(code) => state.store.get_by_language(code).await,
        SearchFilter::Key(key) => state.store.get_by_key(key).await,
    }
    .map_err(|e| ApiError::from_store(e, "there was a problem retrieving the resources"))?;

    Ok(Json(Data::new(resources)))
}

/// `POST /resources` with one resource or an array of them
pub async fn add_resources(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Data<Vec<Resource>>>), ApiError> {
    let payloads = parse_resources(&body).map_err(ApiError::bad_request)?;
    let resources = validate_resource_data(payloads)
        .map_err(|errors| {
            ApiError::with_messages(StatusCode::BAD_REQUEST, errors.into_messages())
        })?;

    state
        .store
        .add_resources(&resources)
        .await
        .map_err(|e| ApiError::from_store(e, "there was an error adding resources"))?;

    info!("Added {} resources via {} store", resources.len(), state.store.backend());
    Ok((StatusCode::CREATED, Json(Data::new(resources))))
}

/// `PUT /resources`: replace the text of existing (key, language code) pairs
pub async fn update_resources(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let payloads = parse_resources(&body).map_err(ApiError::bad_request)?;
    let resources = validate_resource_data(payloads)
        .map_err(|errors| {
            ApiError::with_messages(StatusCode::BAD_REQUEST, errors.into_messages())
        })?;

    let changed = state
        .store
        .update_resource_values(&resources)
        .await
        .map_err(|e| ApiError::from_store(e, "there was a problem updating the resources"))?;

    if changed == 0 {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "no items to update found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /resources?languagecode=xx&key=k`
pub async fn delete_resources(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> Result<StatusCode, ApiError> {
    let language_code = query.language_code.unwrap_or_default();
    let key = query.key.unwrap_or_default();
    if !language_code_is_valid(&language_code) || key.is_empty() {
        return Err(ApiError::bad_request(
            "to delete a resource you need to provide a valid languagecode and key",
        ));
    }

    state
        .store
        .remove_resources(&key, &language_code)
        .await
        .map_err(|e| {
            ApiError::from_store(e, "there was a problem removing the specified resources")
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /resources/languages`
pub async fn get_languages(
    State(state): State<AppState>,
) -> Result<Json<Data<Vec<LanguageSummary>>>, ApiError> {
    let languages = state
        .store
        .existing_language_codes()
        .await
        .map_err(|e| {
            ApiError::from_store(e, "there was a problem retrieving the available languages")
        })?;

    Ok(Json(Data::new(languages)))
}
