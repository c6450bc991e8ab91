//! Remote store access.
//!
//! The store is a hierarchy of folders and files reachable through a small
//! read-only API: list the children of a folder (filtered, paged), fetch a
//! single entry's metadata, or open a byte stream for a file. Everything
//! above this module goes through the [`StoreClient`] trait so the HTTP
//! implementation can be swapped for [`MemoryStore`] in tests.

pub mod client;
mod error;
pub mod memory;
mod types;

pub use client::{ByteStream, HttpStoreClient, StoreClient};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use types::{Entry, EntryKind, ListFilter, Page, FOLDER_MIME_TYPE, PAGE_SIZE};
