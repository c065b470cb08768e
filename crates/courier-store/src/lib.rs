//! Durable storage for courier.
//!
//! Provides:
//! - `CredentialStore` / `CachedKeyStore` - Credential and key-material
//!   persistence with the engine-facing bulk contract
//! - `MessageArchive` - Group and message ingestion records served back to
//!   the engine
//! - Storage backends (memory, SQLite)

pub mod archive;
pub mod credentials;
pub mod storage;

pub use archive::{MessageArchive, NullArchive};
pub use credentials::{CachedKeyStore, CredentialStore};
pub use storage::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
