//! Thumbnail and raw download routes.
//!
//! Thumbnails stream through the transform pipeline; the response is only
//! committed once the first output frame (or the first error) arrives, so
//! decode failures still surface as a proper server error. Raw downloads
//! are an untouched pass-through of the store's byte stream.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::io;
use tokio_stream::wrappers::ReceiverStream;

use super::{store_error_response, AppContext};
use crate::transform::{self, TransformError};

/// Create file-serving routes.
pub fn file_routes() -> Router<AppContext> {
    Router::new()
        .route("/thumbnails/:file_id", get(get_thumbnail))
        .route("/download/:id", get(download))
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailQuery {
    /// Target width in pixels; height follows the aspect ratio.
    pub width: Option<u32>,
}

/// Stream a resized, re-encoded thumbnail for a file.
///
/// The output is a pure function of (file id, width), hence the immutable
/// cache directive.
async fn get_thumbnail(
    State(ctx): State<AppContext>,
    Path(file_id): Path<String>,
    Query(query): Query<ThumbnailQuery>,
) -> Response {
    let width = query.width.unwrap_or(transform::DEFAULT_WIDTH);
    if width == 0 || width > transform::MAX_WIDTH {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("width must be between 1 and {}", transform::MAX_WIDTH)
            })),
        )
            .into_response();
    }

    let source = match ctx.store.open_stream(&file_id).await {
        Ok(s) => s,
        Err(e) => return store_error_response(e, "get_thumbnail", &file_id),
    };

    let mut rx = transform::transform(source.map_err(io::Error::other), width);

    // Hold the response until the pipeline commits its first frame, so a
    // bad source is still a clean server error rather than a dead stream.
    let first = match rx.recv().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => {
            tracing::error!(%file_id, error = %e, "thumbnail transform failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to transform image"})),
            )
                .into_response();
        }
        None => {
            tracing::error!(%file_id, "thumbnail pipeline ended without output");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to transform image"})),
            )
                .into_response();
        }
    };

    let rest = ReceiverStream::new(rx);
    let body = Body::from_stream(
        stream::once(async move { Ok::<_, TransformError>(first) }).chain(rest),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, transform::OUTPUT_CONTENT_TYPE)
        .header(
            header::CACHE_CONTROL,
            "public, max-age=31536000, immutable",
        )
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Download a file's raw bytes, or list a folder's images.
///
/// No transform, no policy: file bytes pass through with the source mime
/// type; a folder id yields the image entries it directly contains.
async fn download(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let entry = match ctx.store.get_metadata(&id).await {
        Ok(e) => e,
        Err(e) => return store_error_response(e, "download", &id),
    };

    if entry.is_folder() {
        return match ctx.albums.collect_images(&id).await {
            Ok(files) => Json(serde_json::json!({ "files": files })).into_response(),
            Err(e) => store_error_response(e, "download_folder", &id),
        };
    }

    let stream = match ctx.store.open_stream(&id).await {
        Ok(s) => s,
        Err(e) => return store_error_response(e, "download", &id),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, entry.mime_type)
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
