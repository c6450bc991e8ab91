//! Album assembly and folder-level operations.
//!
//! An album is a derived view of a top-level folder: its id and name plus
//! one resolved cover image id. Albums are computed on demand and held only
//! in the TTL cache; nothing is persisted.

pub mod resolver;

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;

use crate::cache::TtlCache;
use crate::store::{Entry, ListFilter, StoreClient, StoreError};

/// File name marking a folder's password file.
pub const PASSWORD_FILE_NAME: &str = "password.txt";

/// Cover resolutions for independent folders run in parallel, bounding
/// listing latency to roughly the slowest folder.
const MAX_CONCURRENT_RESOLVES: usize = 8;

/// Cache holding assembled album listings keyed by root id.
pub type AlbumCache = TtlCache<Arc<Vec<Album>>>;

/// One album in a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub name: String,
    pub cover_image_id: Option<String>,
}

/// Album listing and folder lookups over the store, memoized per root.
pub struct AlbumService {
    store: Arc<dyn StoreClient>,
    cache: Arc<AlbumCache>,
}

impl AlbumService {
    pub fn new(store: Arc<dyn StoreClient>, cache: Arc<AlbumCache>) -> Self {
        Self { store, cache }
    }

    /// List the albums under a root folder.
    ///
    /// Served from cache when fresh. On a miss, all child folders are
    /// enumerated (following pages to exhaustion) and their covers resolved
    /// concurrently, in listing order. Concurrent misses for the same root
    /// each recompute; the reads are idempotent so the last write wins.
    pub async fn list_albums(&self, root_id: &str) -> Result<Arc<Vec<Album>>, StoreError> {
        let key = format!("albums:{root_id}");
        if let Some(albums) = self.cache.get(&key) {
            tracing::debug!(root_id, "album listing served from cache");
            return Ok(albums);
        }

        let folders = self.collect_children(root_id, ListFilter::folders()).await?;
        tracing::debug!(root_id, folders = folders.len(), "resolving album covers");

        let albums: Vec<Album> = futures::stream::iter(folders)
            .map(|folder| {
                let store = Arc::clone(&self.store);
                async move {
                    let cover_image_id =
                        resolver::resolve_cover(store.as_ref(), &folder.id).await?;
                    Ok::<_, StoreError>(Album {
                        id: folder.id,
                        name: folder.name,
                        cover_image_id,
                    })
                }
            })
            .buffered(MAX_CONCURRENT_RESOLVES)
            .try_collect()
            .await?;

        let albums = Arc::new(albums);
        self.cache.insert(key, Arc::clone(&albums));
        Ok(albums)
    }

    /// Id of the folder's password file, if it has one.
    pub async fn find_password_file(
        &self,
        folder_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let page = self
            .store
            .list_children(folder_id, &ListFilter::named(PASSWORD_FILE_NAME), None)
            .await?;
        Ok(page
            .entries
            .into_iter()
            .find(|e| !e.is_folder())
            .map(|e| e.id))
    }

    /// All images directly inside a folder, oldest first.
    pub async fn collect_images(&self, folder_id: &str) -> Result<Vec<Entry>, StoreError> {
        self.collect_children(folder_id, ListFilter::images_by_created())
            .await
    }

    async fn collect_children(
        &self,
        parent_id: &str,
        filter: ListFilter,
    ) -> Result<Vec<Entry>, StoreError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .store
                .list_children(parent_id, &filter, page_token.as_deref())
                .await?;
            entries.extend(page.entries);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(entries)
    }
}

/// Normalize password file content for display: drop invisible characters,
/// normalize line endings, trim surrounding whitespace.
pub fn sanitize_password(raw: &str) -> String {
    raw.chars()
        .filter(|c| !is_invisible(*c))
        .collect::<String>()
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_string()
}

fn is_invisible(c: char) -> bool {
    // Zero-width and joiner characters that paste tools smuggle in, plus
    // BOM/word-joiner and soft hyphen.
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}
