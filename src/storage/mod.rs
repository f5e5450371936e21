//! # Storage Collaborators
//!
//! Narrow interfaces to the two external stores the service talks to:
//!
//! - **ObjectStore**: fetches uploaded audio files by container and key
//! - **DocumentStore**: persists user context items in the tagged wire format
//!
//! ## Backends:
//! - **fs**: object store rooted at a local directory
//! - **memory**: in-process object and document stores
//! - **retry**: wraps any object store with exponential backoff
//!
//! Both traits are blocking. Callers on the async runtime go through
//! `web::block`.

pub mod fs;
pub mod memory;
pub mod retry;

use crate::codec::Item;
use anyhow::Result;

/// Read access to stored audio objects.
pub trait ObjectStore: Send + Sync {
    /// Fetch the full contents of `key` inside `container`.
    fn download(&self, container: &str, key: &str) -> Result<Vec<u8>>;
}

/// Key/value access to wire-encoded documents.
pub trait DocumentStore: Send + Sync {
    /// Look up an item by its primary key attributes.
    fn get(&self, table: &str, key: &Item) -> Result<Option<Item>>;

    /// Insert or replace an item. The primary key is read from the item.
    fn put(&self, table: &str, item: Item) -> Result<()>;

    /// Remove an item. Deleting a missing item is not an error.
    fn delete(&self, table: &str, key: &Item) -> Result<()>;
}

pub use fs::FsObjectStore;
pub use memory::MemoryDocumentStore;
#[cfg(test)]
pub use memory::MemoryObjectStore;
pub use retry::{RetryPolicy, RetryingObjectStore};
