//! Cover image resolution.
//!
//! Picks one representative image id for a folder by running an ordered
//! list of strategies. A strategy is a pure lookup: given the folder id it
//! either names an image, reports that it has nothing, or fails with a
//! store error. The first strategy producing an image wins and later ones
//! never run. Reordering or adding fallback steps is an edit to
//! [`STRATEGIES`], not to control flow.

use futures::future::BoxFuture;

use crate::store::{ListFilter, StoreClient, StoreError};

/// Subfolder name that explicitly designates cover candidates.
pub const COVER_FOLDER_NAME: &str = "cover";

type Strategy =
    for<'a> fn(&'a dyn StoreClient, &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("cover-subfolder", cover_subfolder),
    ("direct-children", direct_children),
];

/// Resolve the cover image for a folder.
///
/// `Ok(None)` means the folder genuinely has no image anywhere in the
/// fallback chain; callers render a placeholder, not an error. Results
/// depend on the store's creation-time ordering, so concurrent uploads can
/// legitimately shift the outcome between calls.
pub async fn resolve_cover(
    store: &dyn StoreClient,
    folder_id: &str,
) -> Result<Option<String>, StoreError> {
    for (name, strategy) in STRATEGIES {
        if let Some(image_id) = strategy(store, folder_id).await? {
            tracing::trace!(folder_id, strategy = name, image_id = %image_id, "cover resolved");
            return Ok(Some(image_id));
        }
    }
    tracing::trace!(folder_id, "no cover image found");
    Ok(None)
}

/// Earliest image inside a child folder named `cover` (case-insensitive).
/// Yields nothing when the subfolder is absent or holds no images.
fn cover_subfolder<'a>(
    store: &'a dyn StoreClient,
    folder_id: &'a str,
) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
    Box::pin(async move {
        let mut page_token: Option<String> = None;
        loop {
            let page = store
                .list_children(folder_id, &ListFilter::folders(), page_token.as_deref())
                .await?;

            if let Some(subfolder) = page
                .entries
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(COVER_FOLDER_NAME))
            {
                return earliest_image(store, &subfolder.id).await;
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    })
}

/// Earliest image directly inside the folder itself.
fn direct_children<'a>(
    store: &'a dyn StoreClient,
    folder_id: &'a str,
) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
    Box::pin(earliest_image(store, folder_id))
}

/// First entry of an oldest-first image listing. The store orders the page,
/// so only the first page is needed.
async fn earliest_image(
    store: &dyn StoreClient,
    folder_id: &str,
) -> Result<Option<String>, StoreError> {
    let page = store
        .list_children(folder_id, &ListFilter::images_by_created(), None)
        .await?;
    Ok(page.entries.first().map(|e| e.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use bytes::Bytes;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, secs).unwrap()
    }

    fn image(store: &MemoryStore, parent: &str, id: &str, secs: u32) {
        store.add_file(
            parent,
            id,
            &format!("{id}.jpg"),
            "image/jpeg",
            ts(secs),
            Bytes::new(),
        );
    }

    #[tokio::test]
    async fn test_cover_subfolder_beats_direct_children() {
        let store = MemoryStore::new();
        store.add_folder("A", "A-cover", "cover", ts(0));
        // Direct child created earlier than the cover-subfolder image; the
        // subfolder still wins.
        image(&store, "A", "x2", 1);
        image(&store, "A-cover", "x1", 10);

        let cover = resolve_cover(&store, "A").await.unwrap();
        assert_eq!(cover.as_deref(), Some("x1"));
    }

    #[tokio::test]
    async fn test_cover_subfolder_name_is_case_insensitive() {
        let store = MemoryStore::new();
        store.add_folder("A", "A-cover", "Cover", ts(0));
        image(&store, "A-cover", "x1", 0);

        let cover = resolve_cover(&store, "A").await.unwrap();
        assert_eq!(cover.as_deref(), Some("x1"));
    }

    #[tokio::test]
    async fn test_earliest_image_wins_within_cover_subfolder() {
        let store = MemoryStore::new();
        store.add_folder("A", "A-cover", "cover", ts(0));
        image(&store, "A-cover", "newer", 30);
        image(&store, "A-cover", "older", 5);

        let cover = resolve_cover(&store, "A").await.unwrap();
        assert_eq!(cover.as_deref(), Some("older"));
    }

    #[tokio::test]
    async fn test_empty_cover_subfolder_falls_back_to_direct() {
        let store = MemoryStore::new();
        store.add_folder("A", "A-cover", "cover", ts(0));
        image(&store, "A", "direct", 3);

        let cover = resolve_cover(&store, "A").await.unwrap();
        assert_eq!(cover.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn test_no_subfolder_uses_earliest_direct_image() {
        let store = MemoryStore::new();
        image(&store, "B", "late", 40);
        image(&store, "B", "early", 2);

        let cover = resolve_cover(&store, "B").await.unwrap();
        assert_eq!(cover.as_deref(), Some("early"));
    }

    #[tokio::test]
    async fn test_non_image_files_are_ignored() {
        let store = MemoryStore::new();
        store.add_file("B", "pw", "password.txt", "text/plain", ts(0), Bytes::new());
        image(&store, "B", "img", 9);

        let cover = resolve_cover(&store, "B").await.unwrap();
        assert_eq!(cover.as_deref(), Some("img"));
    }

    #[tokio::test]
    async fn test_no_images_anywhere_is_none_not_error() {
        let store = MemoryStore::new();
        store.add_folder("C", "C-sub", "holidays", ts(0));

        let cover = resolve_cover(&store, "C").await.unwrap();
        assert_eq!(cover, None);
    }

    #[tokio::test]
    async fn test_cover_subfolder_found_past_first_page() {
        // Page size 2 with the cover subfolder sorted last among folders.
        let store = MemoryStore::with_page_size(2);
        store.add_folder("A", "sub1", "alpha", ts(0));
        store.add_folder("A", "sub2", "beta", ts(1));
        store.add_folder("A", "A-cover", "cover", ts(2));
        image(&store, "A-cover", "x1", 0);

        let cover = resolve_cover(&store, "A").await.unwrap();
        assert_eq!(cover.as_deref(), Some("x1"));
    }
}
