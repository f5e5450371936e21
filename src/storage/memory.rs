//! In-process stores. Used for the user-context table when no external
//! document store is configured, and throughout the tests.

#[cfg(test)]
use super::ObjectStore;
use super::DocumentStore;
use crate::codec::{Item, WireAttribute};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Objects held in memory, keyed by `(container, key)`.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

#[cfg(test)]
impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container: &str, key: &str, data: Vec<u8>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((container.to_string(), key.to_string()), data);
    }
}

#[cfg(test)]
impl ObjectStore for MemoryObjectStore {
    fn download(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("NoSuchKey: {}/{}", container, key))
    }
}

/// Tables of items, each table keyed by a single partition-key attribute.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    partition_key: String,
    tables: RwLock<HashMap<String, HashMap<String, Item>>>,
}

impl MemoryDocumentStore {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Number of items currently stored in `table`.
    #[cfg(test)]
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn key_of(&self, attributes: &Item) -> Result<String> {
        let attribute = attributes
            .get(&self.partition_key)
            .ok_or_else(|| anyhow!("Missing partition key attribute '{}'", self.partition_key))?;

        match attribute {
            WireAttribute::S(value) | WireAttribute::N(value) => Ok(value.clone()),
            other => Err(anyhow!(
                "Partition key '{}' must be S or N, got {}",
                self.partition_key,
                other.tag()
            )),
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, table: &str, key: &Item) -> Result<Option<Item>> {
        let key = self.key_of(key)?;
        Ok(self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .and_then(|items| items.get(&key))
            .cloned())
    }

    fn put(&self, table: &str, item: Item) -> Result<()> {
        let key = self.key_of(&item)?;
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    fn delete(&self, table: &str, key: &Item) -> Result<()> {
        let key = self.key_of(key)?;
        if let Some(items) = self
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(table)
        {
            items.remove(&key);
        }
        Ok(())
    }
}
