//! Tag listing and creation.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use polyglot_core::NewTag;
use serde_json::{json, Value};

use super::AppState;
use crate::network::ApiError;

/// `GET /tags`, ordered by name.
///
/// # Errors
///
/// Returns 500 if the store fails.
pub async fn list_tags_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tags = state.services.translations.list_tags().await?;
    Ok(Json(json!({ "data": tags })))
}

/// `POST /tags`
///
/// # Errors
///
/// Returns 422 for invalid input or a taken name.
pub async fn create_tag_handler(
    State(state): State<AppState>,
    input: Result<Json<NewTag>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = input?;
    let tag = state.services.translations.create_tag(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": tag }))))
}
