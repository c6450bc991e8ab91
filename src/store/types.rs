use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mime type the store assigns to folder entries.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.store.folder";

/// Number of entries requested per page. Fixed server-side; clients cannot
/// change it.
pub const PAGE_SIZE: u32 = 25;

/// A single folder or file entry as returned by the remote store.
///
/// Entries are immutable snapshots; the service reads their fields to drive
/// policy decisions but never mutates or writes them back.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Entry kind selector for child listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Image,
}

/// Filter applied to a child listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<EntryKind>,
    /// Exact-name match, used for password file lookup.
    pub name: Option<String>,
    /// Order results by creation time, oldest first.
    pub order_by_created: bool,
}

impl ListFilter {
    /// Child folders only.
    pub fn folders() -> Self {
        Self {
            kind: Some(EntryKind::Folder),
            ..Default::default()
        }
    }

    /// Image files only, oldest first.
    pub fn images_by_created() -> Self {
        Self {
            kind: Some(EntryKind::Image),
            order_by_created: true,
            ..Default::default()
        }
    }

    /// Entries with the given exact name.
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// Whether an entry satisfies this filter. Used by in-process store
    /// implementations; the HTTP client translates the filter to query
    /// parameters instead.
    pub fn matches(&self, entry: &Entry) -> bool {
        let kind_ok = match self.kind {
            None => true,
            Some(EntryKind::Folder) => entry.is_folder(),
            Some(EntryKind::Image) => entry.is_image(),
        };
        let name_ok = self.name.as_deref().map_or(true, |n| entry.name == n);
        kind_ok && name_ok
    }
}

/// One page of a child listing.
///
/// `next_page_token` is an opaque cursor owned by the store. Its absence is
/// the only end-of-list signal; a short page means nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
