//! Credential and key-material persistence.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{
    cache::TtlCache,
    traits::{BlobStorage, KeyStore, Table},
};
use futures::future::join_all;

/// Row id of the root credential record.
const CREDS_ID: &str = "creds";

/// Durable store for the root credential record and per-category key
/// material, all in the `sessions` table.
///
/// Reads and writes never propagate storage failures: a failed read degrades
/// to "not found" and a failed write is logged and dropped. A missing key is
/// something the protocol engine recovers from; a crashed engine is not.
pub struct CredentialStore {
    storage: Arc<dyn BlobStorage>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self { storage }
    }

    fn key_id(category: &str, id: &str) -> String {
        format!("{category}-{id}")
    }

    /// Read a named blob. Storage failure degrades to `None`.
    pub async fn load(&self, name: &str) -> Option<Bytes> {
        match self.storage.get(Table::Sessions, name).await {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(name, error = %e, "credential read failed, treating as missing");
                None
            }
        }
    }

    /// Upsert a named blob. Storage failure is logged and swallowed.
    pub async fn save(&self, name: &str, payload: Bytes) {
        if let Err(e) = self.storage.put(Table::Sessions, name, payload).await {
            tracing::error!(name, error = %e, "credential write failed");
        }
    }

    /// Delete one named blob.
    pub async fn remove(&self, name: &str) {
        if let Err(e) = self.storage.delete(Table::Sessions, name).await {
            tracing::error!(name, error = %e, "credential delete failed");
        }
    }

    /// Delete every session and key row. Used on terminal disconnect to
    /// force re-pairing.
    pub async fn clear_all(&self) {
        if let Err(e) = self.storage.clear(Table::Sessions).await {
            tracing::error!(error = %e, "credential clear failed");
        }
    }

    /// Persist the root credential blob.
    pub async fn save_credentials(&self, payload: Bytes) {
        self.save(CREDS_ID, payload).await;
    }

    /// Load the root credential record, or create one via `fresh` and
    /// persist it before first use.
    pub async fn load_or_init(&self, fresh: impl FnOnce() -> Bytes + Send) -> Bytes {
        if let Some(existing) = self.load(CREDS_ID).await {
            return existing;
        }
        tracing::info!("no stored credentials, initializing fresh session state");
        let creds = fresh();
        self.save(CREDS_ID, creds.clone()).await;
        creds
    }

    /// Fetch key material for each id concurrently; a failure on one id
    /// yields `None` for that id only.
    pub async fn bulk_get(&self, category: &str, ids: &[String]) -> HashMap<String, Option<Bytes>> {
        let lookups = ids.iter().map(|id| async move {
            let value = self.load(&Self::key_id(category, id)).await;
            (id.clone(), value)
        });
        join_all(lookups).await.into_iter().collect()
    }

    /// Write (`Some`) or delete (`None`) each entry concurrently. Completes
    /// once every entry has been attempted.
    pub async fn bulk_set(&self, category: &str, entries: HashMap<String, Option<Bytes>>) {
        let writes = entries.into_iter().map(|(id, value)| async move {
            let name = Self::key_id(category, &id);
            match value {
                Some(payload) => self.save(&name, payload).await,
                None => self.remove(&name).await,
            }
        });
        join_all(writes).await;
    }
}

/// Engine-facing key store with a short-TTL hot cache in front of reads.
///
/// Cached values are `Bytes`, so repeated reads of the same key hand the
/// engine the same buffer rather than a copy.
pub struct CachedKeyStore {
    store: Arc<CredentialStore>,
    cache: Arc<TtlCache<Bytes>>,
}

impl CachedKeyStore {
    /// Front `store` with `cache`, normally the supervisor's connection-
    /// scoped `session_keys` cache.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>, cache: Arc<TtlCache<Bytes>>) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl KeyStore for CachedKeyStore {
    async fn bulk_get(&self, category: &str, ids: &[String]) -> HashMap<String, Option<Bytes>> {
        let mut resolved = HashMap::with_capacity(ids.len());
        let mut misses = Vec::new();

        for id in ids {
            match self.cache.get(&CredentialStore::key_id(category, id)) {
                Some(hit) => {
                    resolved.insert(id.clone(), Some(hit));
                }
                None => misses.push(id.clone()),
            }
        }

        if !misses.is_empty() {
            for (id, value) in self.store.bulk_get(category, &misses).await {
                if let Some(payload) = &value {
                    self.cache
                        .insert(CredentialStore::key_id(category, &id), payload.clone());
                }
                resolved.insert(id, value);
            }
        }

        resolved
    }

    async fn bulk_set(&self, category: &str, entries: HashMap<String, Option<Bytes>>) {
        for (id, value) in &entries {
            let name = CredentialStore::key_id(category, id);
            match value {
                Some(payload) => self.cache.insert(name, payload.clone()),
                None => self.cache.remove(&name),
            }
        }
        self.store.bulk_set(category, entries).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::traits::{BlobStorage, StorageError};

    use super::*;
    use crate::storage::MemoryStorage;

    /// Storage stub that fails reads/writes for ids containing a marker.
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_marker: &'static str,
    }

    impl FlakyStorage {
        fn failing_on(fail_marker: &'static str) -> Self {
            Self {
                inner: MemoryStorage::new(),
                fail_marker,
            }
        }
    }

    #[async_trait]
    impl BlobStorage for FlakyStorage {
        async fn get(&self, table: Table, id: &str) -> Result<Option<Bytes>, StorageError> {
            if id.contains(self.fail_marker) {
                return Err(StorageError::Backend("disk on fire".into()));
            }
            self.inner.get(table, id).await
        }

        async fn put(&self, table: Table, id: &str, payload: Bytes) -> Result<(), StorageError> {
            if id.contains(self.fail_marker) {
                return Err(StorageError::Backend("disk on fire".into()));
            }
            self.inner.put(table, id, payload).await
        }

        async fn delete(&self, table: Table, id: &str) -> Result<(), StorageError> {
            self.inner.delete(table, id).await
        }

        async fn clear(&self, table: Table) -> Result<(), StorageError> {
            self.inner.clear(table).await
        }
    }

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn load_or_init_persists_fresh_credentials() {
        let store = store();
        let creds = store
            .load_or_init(|| Bytes::from_static(b"fresh"))
            .await;
        assert_eq!(creds.as_ref(), b"fresh");

        // Second call reads the persisted record, factory is not consulted.
        let again = store.load_or_init(|| unreachable!()).await;
        assert_eq!(again.as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn degraded_read_yields_none_not_error() {
        let store = CredentialStore::new(Arc::new(FlakyStorage::failing_on("creds-7")));
        assert!(store.load("creds-7").await.is_none());
    }

    #[tokio::test]
    async fn bulk_get_isolates_per_id_failures() {
        let storage = Arc::new(FlakyStorage::failing_on("bad"));
        let store = CredentialStore::new(storage);
        store
            .save("session-good", Bytes::from_static(b"k1"))
            .await;

        let ids = vec!["good".to_string(), "bad".to_string()];
        let result = store.bulk_get("session", &ids).await;
        assert_eq!(result["good"].as_ref().unwrap().as_ref(), b"k1");
        assert!(result["bad"].is_none());
    }

    #[tokio::test]
    async fn bulk_set_writes_and_deletes() {
        let store = store();
        store.save("sender-key-old", Bytes::from_static(b"old")).await;

        let mut entries = HashMap::new();
        entries.insert("new".to_string(), Some(Bytes::from_static(b"fresh")));
        entries.insert("old".to_string(), None);
        store.bulk_set("sender-key", entries).await;

        assert_eq!(
            store.load("sender-key-new").await.unwrap().as_ref(),
            b"fresh"
        );
        assert!(store.load("sender-key-old").await.is_none());
    }

    #[tokio::test]
    async fn clear_all_forces_reinit() {
        let store = store();
        store.load_or_init(|| Bytes::from_static(b"first")).await;
        store.clear_all().await;
        let creds = store.load_or_init(|| Bytes::from_static(b"second")).await;
        assert_eq!(creds.as_ref(), b"second");
    }

    #[tokio::test(start_paused = true)]
    async fn cached_key_store_serves_repeat_reads_from_cache() {
        let credentials = Arc::new(store());
        credentials.save("session-s1", Bytes::from_static(b"k")).await;

        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        let keys = CachedKeyStore::new(Arc::clone(&credentials), cache);

        let ids = vec!["s1".to_string()];
        let first = keys.bulk_get("session", &ids).await;
        assert!(first["s1"].is_some());

        // Remove from the durable layer; the cache still answers.
        credentials.remove("session-s1").await;
        let second = keys.bulk_get("session", &ids).await;
        assert!(second["s1"].is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cached_key_store_delete_invalidates_cache() {
        let credentials = Arc::new(store());
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        let keys = CachedKeyStore::new(Arc::clone(&credentials), cache);

        let mut entries = HashMap::new();
        entries.insert("s1".to_string(), Some(Bytes::from_static(b"k")));
        keys.bulk_set("session", entries).await;

        let mut tombstone = HashMap::new();
        tombstone.insert("s1".to_string(), None);
        keys.bulk_set("session", tombstone).await;

        let read = keys.bulk_get("session", &["s1".to_string()]).await;
        assert!(read["s1"].is_none());
    }
}
