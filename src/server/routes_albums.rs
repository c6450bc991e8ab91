//! Album listing, pagination, and password API routes.
//!
//! The image listing endpoint is a pure pass-through pagination forwarder:
//! the upstream cursor is threaded to and from the client unchanged, and a
//! page is never retried, reordered, or cached.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use super::{store_error_response, AppContext};
use crate::albums::sanitize_password;
use crate::store::{Entry, ListFilter};

/// Password files are tiny; anything past this is not a password file.
const MAX_PASSWORD_BYTES: usize = 64 * 1024;

/// Create album-related routes.
pub fn album_routes() -> Router<AppContext> {
    Router::new()
        .route("/albums/:root_id", get(list_albums))
        .route("/folders/:folder_id/images", get(list_images))
        .route("/folders/:folder_id/password", get(get_password_file_id))
        .route("/files/:file_id/password", get(get_password_content))
}

// ============================================================================
// Request/response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(rename = "pageToken")]
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    files: Vec<Entry>,
    next_page_token: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the albums under a root folder, each with its resolved cover.
async fn list_albums(
    State(ctx): State<AppContext>,
    Path(root_id): Path<String>,
) -> impl IntoResponse {
    match ctx.albums.list_albums(&root_id).await {
        Ok(albums) => Json(albums.as_ref().clone()).into_response(),
        Err(e) => store_error_response(e, "list_albums", &root_id),
    }
}

/// List one page of a folder's images, forwarding the upstream cursor.
async fn list_images(
    State(ctx): State<AppContext>,
    Path(folder_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let page = ctx
        .store
        .list_children(
            &folder_id,
            &ListFilter::images_by_created(),
            query.page_token.as_deref(),
        )
        .await;

    match page {
        Ok(page) => Json(FileListResponse {
            files: page.entries,
            next_page_token: page.next_page_token,
        })
        .into_response(),
        Err(e) => store_error_response(e, "list_images", &folder_id),
    }
}

/// Report the id of a folder's password file, `null` when it has none.
async fn get_password_file_id(
    State(ctx): State<AppContext>,
    Path(folder_id): Path<String>,
) -> impl IntoResponse {
    match ctx.albums.find_password_file(&folder_id).await {
        Ok(id) => Json(serde_json::json!({ "passwordFileId": id })).into_response(),
        Err(e) => store_error_response(e, "get_password_file_id", &folder_id),
    }
}

/// Serve a password file's content as sanitized plain text.
async fn get_password_content(
    State(ctx): State<AppContext>,
    Path(file_id): Path<String>,
) -> impl IntoResponse {
    let mut stream = match ctx.store.open_stream(&file_id).await {
        Ok(s) => s,
        Err(e) => return store_error_response(e, "get_password_content", &file_id),
    };

    let mut data = Vec::new();
    loop {
        match stream.try_next().await {
            Ok(Some(chunk)) => {
                data.extend_from_slice(&chunk);
                if data.len() > MAX_PASSWORD_BYTES {
                    tracing::warn!(%file_id, "password file exceeds size limit");
                    return (
                        axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                        Json(serde_json::json!({"error": "File too large for a password file"})),
                    )
                        .into_response();
                }
            }
            Ok(None) => break,
            Err(e) => return store_error_response(e, "get_password_content", &file_id),
        }
    }

    let text = sanitize_password(&String::from_utf8_lossy(&data));
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response()
}
