//! In-memory blob storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::traits::{BlobStorage, StorageError, Table};

use super::now_ms;

#[derive(Clone)]
struct Record {
    payload: Bytes,
    created_at: i64,
    updated_at: i64,
}

/// In-memory storage implementation.
///
/// Useful for development and tests. Data is lost on restart.
pub struct MemoryStorage {
    tables: RwLock<HashMap<(Table, String), Record>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Row timestamps, for tests asserting upsert semantics.
    #[must_use]
    pub fn timestamps(&self, table: Table, id: &str) -> Option<(i64, i64)> {
        self.tables
            .read()
            .ok()?
            .get(&(table, id.to_string()))
            .map(|r| (r.created_at, r.updated_at))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn get(&self, table: Table, id: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self
            .tables
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .get(&(table, id.to_string()))
            .map(|r| r.payload.clone()))
    }

    async fn put(&self, table: Table, id: &str, payload: Bytes) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let now = now_ms();
        let key = (table, id.to_string());
        match tables.get_mut(&key) {
            Some(record) => {
                record.payload = payload;
                // updated_at strictly increases even under a coarse clock.
                record.updated_at = now.max(record.updated_at + 1);
            }
            None => {
                tables.insert(
                    key,
                    Record {
                        payload,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), StorageError> {
        self.tables
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .remove(&(table, id.to_string()));
        Ok(())
    }

    async fn clear(&self, table: Table) -> Result<(), StorageError> {
        self.tables
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .retain(|(t, _), _| *t != table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_with_strictly_later_updated_at() {
        let storage = MemoryStorage::new();
        storage
            .put(Table::Messages, "conv1-msg1", Bytes::from_static(b"v1"))
            .await
            .unwrap();
        let (created, first) = storage.timestamps(Table::Messages, "conv1-msg1").unwrap();

        storage
            .put(Table::Messages, "conv1-msg1", Bytes::from_static(b"v2"))
            .await
            .unwrap();
        let (created_after, second) = storage.timestamps(Table::Messages, "conv1-msg1").unwrap();

        let row = storage.get(Table::Messages, "conv1-msg1").await.unwrap();
        assert_eq!(row.unwrap().as_ref(), b"v2");
        assert_eq!(created, created_after);
        assert!(second > first);
    }

    #[tokio::test]
    async fn get_missing_row_is_none() {
        let storage = MemoryStorage::new();
        assert!(storage.get(Table::Sessions, "creds").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_clear_scope_to_one_table() {
        let storage = MemoryStorage::new();
        storage
            .put(Table::Sessions, "creds", Bytes::from_static(b"c"))
            .await
            .unwrap();
        storage
            .put(Table::Sessions, "sender-key-1", Bytes::from_static(b"k"))
            .await
            .unwrap();
        storage
            .put(Table::Groups, "g1", Bytes::from_static(b"g"))
            .await
            .unwrap();

        storage.delete(Table::Sessions, "creds").await.unwrap();
        assert!(storage.get(Table::Sessions, "creds").await.unwrap().is_none());

        storage.clear(Table::Sessions).await.unwrap();
        assert!(
            storage
                .get(Table::Sessions, "sender-key-1")
                .await
                .unwrap()
                .is_none()
        );
        // Other tables are untouched.
        assert!(storage.get(Table::Groups, "g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_missing_row_is_ok() {
        let storage = MemoryStorage::new();
        storage.delete(Table::Messages, "nope").await.unwrap();
    }
}
