//! Store client trait and the HTTP implementation.
//!
//! [`HttpStoreClient`] talks to the store's REST API. Page cursors returned
//! by the store are forwarded verbatim; this module never inspects them.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode};

use super::error::StoreError;
use super::types::{Entry, EntryKind, ListFilter, Page, PAGE_SIZE};

/// Connection timeout for store API requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Total timeout for metadata and listing requests. Content streams are
/// exempt so large downloads are not cut off.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A stream of body bytes from the store.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Read-only access to the remote store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// List one page of a folder's children. `page_token` of `None` requests
    /// the first page; the returned token, when present, fetches the next.
    async fn list_children(
        &self,
        parent_id: &str,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError>;

    /// Fetch a single entry's metadata.
    async fn get_metadata(&self, id: &str) -> Result<Entry, StoreError>;

    /// Open a byte stream for a file's content.
    async fn open_stream(&self, id: &str) -> Result<ByteStream, StoreError>;
}

/// Store client backed by the store's `/v1` REST API.
pub struct HttpStoreClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpStoreClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
        id: &str,
    ) -> Result<Response, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .header("X-Api-Key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| StoreError::Upstream {
                context: context.to_string(),
                source,
            })?;

        check_status(response, context, id)
    }
}

fn check_status(response: Response, context: &str, id: &str) -> Result<Response, StoreError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound { id: id.to_string() }),
        status => Err(StoreError::Status {
            context: context.to_string(),
            status,
        }),
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn list_children(
        &self,
        parent_id: &str,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError> {
        let mut query: Vec<(&str, String)> = vec![
            ("parent", parent_id.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        match filter.kind {
            Some(EntryKind::Folder) => query.push(("kind", "folder".to_string())),
            Some(EntryKind::Image) => query.push(("kind", "image".to_string())),
            None => {}
        }
        if let Some(ref name) = filter.name {
            query.push(("name", name.clone()));
        }
        if filter.order_by_created {
            query.push(("orderBy", "createdAt".to_string()));
        }
        if let Some(token) = page_token {
            // Forwarded untouched; the cursor format belongs to the store.
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .get("/entries", &query, "list_children", parent_id)
            .await?;

        response
            .json::<Page>()
            .await
            .map_err(|source| StoreError::Upstream {
                context: "list_children".to_string(),
                source,
            })
    }

    async fn get_metadata(&self, id: &str) -> Result<Entry, StoreError> {
        let response = self
            .get(&format!("/entries/{id}"), &[], "get_metadata", id)
            .await?;

        response
            .json::<Entry>()
            .await
            .map_err(|source| StoreError::Upstream {
                context: "get_metadata".to_string(),
                source,
            })
    }

    async fn open_stream(&self, id: &str) -> Result<ByteStream, StoreError> {
        // No total timeout here; the stream lives as long as the download.
        let response = self
            .client
            .get(self.url(&format!("/entries/{id}/content")))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|source| StoreError::Upstream {
                context: "open_stream".to_string(),
                source,
            })?;

        let response = check_status(response, "open_stream", id)?;

        let stream = response
            .bytes_stream()
            .map_err(|source| StoreError::Upstream {
                context: "open_stream".to_string(),
                source,
            });

        Ok(Box::pin(stream))
    }
}
