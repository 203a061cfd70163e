//! `GET /export/{code}.json`: the full translation set of one language.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, ETAG};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use tracing::warn;

use super::AppState;
use crate::network::ApiError;
use crate::service::ExportBody;

pub(crate) const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Serves a language export with an `X-Cache` header of `HIT`, `MISS`, or
/// `BYPASS`.
///
/// The path segment must end in `.json`; the code is what precedes it.
///
/// # Errors
///
/// Returns 404 for an unknown language or a path without the suffix.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let Some(code) = file.strip_suffix(".json").filter(|c| !c.is_empty()) else {
        return Err(ApiError::NotFound(format!("No export found for '{file}'.")));
    };

    let export = state.services.exports.export(code).await?;
    let language = export.language.code;

    let body = match export.body {
        ExportBody::Complete(bytes) => Body::from(bytes),
        ExportBody::Stream(stream) => {
            // The request stays in flight until the last chunk is written.
            let guard = state.shutdown.in_flight_guard();
            Body::from_stream(
                stream
                    .inspect_err(move |e| {
                        warn!(%language, error = %e, "export stream failed, aborting response");
                    })
                    .map_ok(move |chunk| {
                        let _streaming = &guard;
                        chunk
                    }),
            )
        }
    };

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_CACHE, HeaderValue::from_static(export.status.as_str()));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", export.fingerprint)) {
        headers.insert(ETAG, etag);
    }
    Ok(response)
}
