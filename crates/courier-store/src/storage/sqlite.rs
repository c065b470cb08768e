//! SQLite blob storage (feature-gated).

use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::traits::{BlobStorage, StorageError, Table};
use sqlx::{
    Row,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};

use super::now_ms;

/// SQLite storage implementation.
///
/// One row per blob across the `sessions`, `groups`, and `messages` tables;
/// upserts replace the whole payload and bump `updated_at` strictly.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) a database file and run table creation.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or migration fails.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StorageError::Backend(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        Self::connect(options).await
    }

    /// Open an in-memory database, for tests.
    ///
    /// # Errors
    /// Returns error if the connection or migration fails.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect to SQLite: {e}")))?;

        let storage = Self { pool };
        storage.create_tables().await?;
        Ok(storage)
    }

    async fn create_tables(&self) -> Result<(), StorageError> {
        for table in [Table::Sessions, Table::Groups, Table::Messages] {
            sqlx::query(&format!(
                r"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    payload BLOB NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                ",
                table.as_str()
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to create table: {e}")))?;
        }
        Ok(())
    }

    /// Flush and close the pool. Called on process shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Row timestamps, for tests asserting upsert semantics.
    ///
    /// # Errors
    /// Returns error on query failure.
    pub async fn timestamps(
        &self,
        table: Table,
        id: &str,
    ) -> Result<Option<(i64, i64)>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT created_at, updated_at FROM {} WHERE id = ?1",
            table.as_str()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(row.map(|r| (r.get::<i64, _>(0), r.get::<i64, _>(1))))
    }
}

#[async_trait]
impl BlobStorage for SqliteStorage {
    async fn get(&self, table: Table, id: &str) -> Result<Option<Bytes>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT payload FROM {} WHERE id = ?1 LIMIT 1",
            table.as_str()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(row.map(|r| Bytes::from(r.get::<Vec<u8>, _>(0))))
    }

    async fn put(&self, table: Table, id: &str, payload: Bytes) -> Result<(), StorageError> {
        let name = table.as_str();
        // MAX(.., updated_at + 1) keeps updated_at strictly increasing even
        // when two upserts land on the same millisecond.
        sqlx::query(&format!(
            r"
            INSERT INTO {name} (id, payload, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = MAX(excluded.updated_at, {name}.updated_at + 1)
            "
        ))
        .bind(id)
        .bind(payload.as_ref())
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), StorageError> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", table.as_str()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self, table: Table) -> Result<(), StorageError> {
        sqlx::query(&format!("DELETE FROM {}", table.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_overwrites_payload_and_bumps_updated_at() {
        let storage = SqliteStorage::open_in_memory().await.unwrap();
        storage
            .put(Table::Messages, "conv1-msg1", Bytes::from_static(b"v1"))
            .await
            .unwrap();
        let (_, first) = storage
            .timestamps(Table::Messages, "conv1-msg1")
            .await
            .unwrap()
            .unwrap();

        storage
            .put(Table::Messages, "conv1-msg1", Bytes::from_static(b"v2"))
            .await
            .unwrap();
        let (_, second) = storage
            .timestamps(Table::Messages, "conv1-msg1")
            .await
            .unwrap()
            .unwrap();

        let row = storage.get(Table::Messages, "conv1-msg1").await.unwrap();
        assert_eq!(row.unwrap().as_ref(), b"v2");
        assert!(second > first);
    }

    #[tokio::test]
    async fn binary_payloads_survive_round_trip() {
        let storage = SqliteStorage::open_in_memory().await.unwrap();
        let blob = Bytes::from(vec![0u8, 159, 146, 150, 255]);
        storage
            .put(Table::Sessions, "sender-key-1", blob.clone())
            .await
            .unwrap();
        let row = storage.get(Table::Sessions, "sender-key-1").await.unwrap();
        assert_eq!(row.unwrap(), blob);
    }

    #[tokio::test]
    async fn clear_empties_only_the_given_table() {
        let storage = SqliteStorage::open_in_memory().await.unwrap();
        storage
            .put(Table::Sessions, "creds", Bytes::from_static(b"c"))
            .await
            .unwrap();
        storage
            .put(Table::Groups, "g1", Bytes::from_static(b"g"))
            .await
            .unwrap();

        storage.clear(Table::Sessions).await.unwrap();
        assert!(storage.get(Table::Sessions, "creds").await.unwrap().is_none());
        assert!(storage.get(Table::Groups, "g1").await.unwrap().is_some());
    }
}
