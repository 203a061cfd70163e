//! Language listing and creation.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use polyglot_core::NewLanguage;
use serde_json::{json, Value};

use super::AppState;
use crate::network::ApiError;

/// `GET /languages`, ordered by code.
///
/// # Errors
///
/// Returns 500 if the store fails.
pub async fn list_languages_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let languages = state.services.translations.list_languages().await?;
    Ok(Json(json!({ "data": languages })))
}

/// `POST /languages`
///
/// # Errors
///
/// Returns 422 for invalid input or a taken code.
pub async fn create_language_handler(
    State(state): State<AppState>,
    input: Result<Json<NewLanguage>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = input?;
    let language = state.services.translations.create_language(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": language }))))
}
