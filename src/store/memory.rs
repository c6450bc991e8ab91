//! In-memory store implementation.
//!
//! Backs unit and integration tests with a seedable folder tree. Pagination
//! uses an offset cursor (`offset:{n}`) owned by this store; callers must
//! treat it as opaque, exactly as they would a real store's cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;

use super::client::{ByteStream, StoreClient};
use super::error::StoreError;
use super::types::{Entry, ListFilter, Page, FOLDER_MIME_TYPE};

const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// Seedable in-memory [`StoreClient`].
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    children: RwLock<HashMap<String, Vec<Entry>>>,
    blobs: RwLock<HashMap<String, Bytes>>,
    page_size: usize,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(25)
    }

    /// A small page size forces multi-page listings in tests.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            children: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            page_size,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_folder(&self, parent_id: &str, id: &str, name: &str, created_at: DateTime<Utc>) {
        self.add_entry(
            parent_id,
            Entry {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
                created_at,
            },
        );
    }

    pub fn add_file(
        &self,
        parent_id: &str,
        id: &str,
        name: &str,
        mime_type: &str,
        created_at: DateTime<Utc>,
        data: impl Into<Bytes>,
    ) {
        self.add_entry(
            parent_id,
            Entry {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                created_at,
            },
        );
        self.blobs.write().insert(id.to_string(), data.into());
    }

    fn add_entry(&self, parent_id: &str, entry: Entry) {
        self.entries
            .write()
            .insert(entry.id.clone(), entry.clone());
        self.children
            .write()
            .entry(parent_id.to_string())
            .or_default()
            .push(entry);
    }

    /// Number of `list_children` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn list_children(
        &self,
        parent_id: &str,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let all = self
            .children
            .read()
            .get(parent_id)
            .cloned()
            .unwrap_or_default();

        let mut matched: Vec<Entry> = all.into_iter().filter(|e| filter.matches(e)).collect();
        if filter.order_by_created {
            matched.sort_by_key(|e| e.created_at);
        }

        let offset = page_token
            .and_then(|t| t.strip_prefix("offset:"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0)
            .min(matched.len());
        let end = (offset + self.page_size).min(matched.len());
        let next_page_token = (end < matched.len()).then(|| format!("offset:{end}"));

        Ok(Page {
            entries: matched[offset..end].to_vec(),
            next_page_token,
        })
    }

    async fn get_metadata(&self, id: &str) -> Result<Entry, StoreError> {
        self.entries
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn open_stream(&self, id: &str) -> Result<ByteStream, StoreError> {
        let data = self
            .blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let chunks: Vec<Result<Bytes, StoreError>> = data
            .chunks(STREAM_CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::TryStreamExt;

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap()
    }

    #[tokio::test]
    async fn test_pagination_covers_all_entries_once() {
        let store = MemoryStore::with_page_size(2);
        for i in 0..5 {
            store.add_file(
                "root",
                &format!("img-{i}"),
                &format!("{i}.jpg"),
                "image/jpeg",
                ts(i),
                Bytes::new(),
            );
        }

        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store
                .list_children("root", &ListFilter::images_by_created(), token.as_deref())
                .await
                .unwrap();
            seen.extend(page.entries.into_iter().map(|e| e.id));
            match page.next_page_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        assert_eq!(seen, vec!["img-0", "img-1", "img-2", "img-3", "img-4"]);
    }

    #[tokio::test]
    async fn test_order_by_created_sorts_ascending() {
        let store = MemoryStore::new();
        store.add_file("root", "late", "late.jpg", "image/jpeg", ts(30), Bytes::new());
        store.add_file("root", "early", "early.jpg", "image/jpeg", ts(1), Bytes::new());

        let page = store
            .list_children("root", &ListFilter::images_by_created(), None)
            .await
            .unwrap();
        assert_eq!(page.entries[0].id, "early");
    }

    #[tokio::test]
    async fn test_open_stream_round_trips_bytes() {
        let store = MemoryStore::new();
        let payload = vec![7u8; 20_000];
        store.add_file("root", "f1", "f1.bin", "image/png", ts(0), payload.clone());

        let stream = store.open_stream("f1").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert!(chunks.len() > 1);
        let total: Vec<u8> = chunks.concat();
        assert_eq!(total, payload);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_metadata("nope").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.open_stream("nope").await.err(),
            Some(StoreError::NotFound { .. })
        ));
    }
}
