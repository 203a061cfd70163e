//! Translation CRUD and search endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use polyglot_core::{NewTranslation, Translation, TranslationId, TranslationPatch};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::network::ApiError;
use crate::service::TranslationQuery;

/// Paginated list envelope.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u64,
}

/// `GET /translations`
///
/// # Errors
///
/// Returns 500 if the store fails.
pub async fn list_translations_handler(
    State(state): State<AppState>,
    query: Result<Query<TranslationQuery>, QueryRejection>,
) -> Result<Json<Paginated<Translation>>, ApiError> {
    let Query(query) = query?;
    let page = state.services.translations.search(query).await?;
    let last_page = page.last_page();
    Ok(Json(Paginated {
        data: page.items,
        current_page: page.request.page,
        per_page: page.request.per_page,
        total: page.total,
        last_page,
    }))
}

/// `GET /translations/{id}`
///
/// # Errors
///
/// Returns 404 for an unknown id.
pub async fn show_translation_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;
    let detail = state.services.translations.get(TranslationId(id)).await?;
    Ok(Json(json!({ "data": detail })))
}

/// `POST /translations`
///
/// # Errors
///
/// Returns 422 for invalid input, an unknown language, or a duplicate key.
pub async fn create_translation_handler(
    State(state): State<AppState>,
    input: Result<Json<NewTranslation>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = input?;
    let detail = state.services.translations.create(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": detail }))))
}

/// `PUT|PATCH /translations/{id}`
///
/// # Errors
///
/// Returns 404 for an unknown id or 422 for invalid input.
pub async fn update_translation_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    patch: Result<Json<TranslationPatch>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let (Path(id), Json(patch)) = (id?, patch?);
    let detail = state
        .services
        .translations
        .update(TranslationId(id), patch)
        .await?;
    Ok(Json(json!({ "data": detail })))
}

/// `DELETE /translations/{id}`
///
/// # Errors
///
/// Returns 404 for an unknown id.
pub async fn delete_translation_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.services.translations.delete(TranslationId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
