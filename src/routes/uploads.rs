use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppResult;
use crate::state::AppState;

/// Serve a stored blob. Variant query parameters are for the image renderer
/// in front of this route and are ignored here.
pub async fn serve(State(state): State<AppState>, Path(key): Path<String>) -> AppResult<Response> {
    match state.blobs.get(&key).await? {
        Some(data) => {
            let mime = mime_guess::from_path(&key).first_or_octet_stream();
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response())
        }
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}
