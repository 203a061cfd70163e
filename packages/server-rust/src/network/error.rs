//! Mapping of service failures onto HTTP responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use polyglot_core::ValidationErrors;
use serde_json::json;
use tracing::error;

use crate::service::ServiceError;

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// 404 with a message naming the missing resource.
    NotFound(String),
    /// 422 with the per-field failures.
    Validation(ValidationErrors),
    /// The request could not be decoded: malformed JSON, a wrong content
    /// type, or a path or query value of the wrong type.
    Rejected(StatusCode, String),
    /// 500. Details are logged, never sent to the client.
    Internal,
}

macro_rules! rejection {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for ApiError {
            fn from(rejection: $ty) -> Self {
                Self::Rejected(rejection.status(), rejection.body_text())
            }
        }
    )*};
}

rejection!(JsonRejection, PathRejection, QueryRejection);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { resource, id } => {
                Self::NotFound(format!("No {resource} found for '{id}'."))
            }
            ServiceError::Validation(errors) => Self::Validation(errors),
            other @ (ServiceError::Store(_) | ServiceError::Serialization(_)) => {
                error!(error = %other, "request failed");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "message": errors.to_string(), "errors": errors })),
            )
                .into_response(),
            Self::Rejected(status, message) => {
                (status, Json(json!({ "message": message }))).into_response()
            }
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Server Error" })),
            )
                .into_response(),
        }
    }
}
