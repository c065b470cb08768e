//! Traits at the seams: durable storage, key material, the protocol engine,
//! and the responder.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    cache::ConnectionCaches,
    content::NormalizedContent,
    events::{EngineEvent, InboundMessage},
};

/// Logical durable tables. Each holds opaque blobs keyed by a string id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Root credentials and per-category key material.
    Sessions,
    /// Last-known group metadata.
    Groups,
    /// Raw inbound message envelopes.
    Messages,
}

impl Table {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Groups => "groups",
            Self::Messages => "messages",
        }
    }
}

/// Storage error.
///
/// Kept distinct from "not found" (which is `Ok(None)` on reads) so failure
/// paths stay visible in logs even where callers degrade them to a miss.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable blob storage: upsert-by-id and point lookup over the three
/// logical tables. The underlying store must tolerate concurrent upserts on
/// distinct keys.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Point lookup. `Ok(None)` when the row does not exist.
    async fn get(&self, table: Table, id: &str) -> Result<Option<Bytes>, StorageError>;

    /// Upsert: replaces the whole payload and refreshes `updated_at`, which
    /// must strictly increase on every write to the same row.
    async fn put(&self, table: Table, id: &str, payload: Bytes) -> Result<(), StorageError>;

    /// Delete one row; deleting a missing row is not an error.
    async fn delete(&self, table: Table, id: &str) -> Result<(), StorageError>;

    /// Delete every row in a table.
    async fn clear(&self, table: Table) -> Result<(), StorageError>;
}

/// Bulk key-material store the protocol engine calls directly.
///
/// Infallible by contract: a failed read degrades to `None` for that id and
/// a failed write is logged and dropped, so a bad row means "regenerate"
/// rather than a crashed engine.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch each id independently; one failure nulls that id only.
    async fn bulk_get(&self, category: &str, ids: &[String]) -> HashMap<String, Option<Bytes>>;

    /// Write or delete (`None`) each entry; completes once every entry has
    /// been attempted.
    async fn bulk_set(&self, category: &str, entries: HashMap<String, Option<Bytes>>);
}

/// Read-back interface the engine uses against previously ingested data.
#[async_trait]
pub trait EngineArchive: Send + Sync {
    /// Last persisted metadata for a group, if any.
    async fn cached_group_metadata(&self, group_id: &str) -> Option<Bytes>;

    /// Raw envelope of a previously stored message, for retransmission.
    async fn stored_message(&self, conversation_id: &str, message_id: &str) -> Option<Bytes>;
}

/// Engine-side failure surfaced to the supervisor or pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to establish connection: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Media fetch failed: {0}")]
    MediaFetch(String),
}

/// Outbound operations on a live connection.
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Send a text reply, optionally quoting a message in the conversation.
    async fn send_text(
        &self,
        conversation_id: &str,
        text: &str,
        quote_message_id: Option<&str>,
    ) -> Result<(), EngineError>;

    /// Mark a message read. Best-effort from the pipeline's point of view.
    async fn mark_read(&self, conversation_id: &str, message_id: &str) -> Result<(), EngineError>;

    /// Announce presence in a conversation. Best-effort.
    async fn announce_presence(&self, conversation_id: &str) -> Result<(), EngineError>;

    /// Download the media attachment of a message.
    async fn fetch_media(&self, message: &InboundMessage) -> Result<Bytes, EngineError>;
}

/// Credential state handed to the engine at construction.
pub struct SessionState {
    /// Root credential blob, freshly initialized when none was stored.
    pub credentials: Bytes,
    /// Bulk key-material store, normally cache-fronted.
    pub keys: std::sync::Arc<dyn KeyStore>,
}

/// A live engine: its event stream plus outbound control surface.
pub struct EngineHandle {
    pub control: std::sync::Arc<dyn EngineControl>,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Constructs a protocol engine for one connection attempt.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn connect(
        &self,
        session: SessionState,
        archive: std::sync::Arc<dyn EngineArchive>,
        caches: std::sync::Arc<ConnectionCaches>,
    ) -> Result<EngineHandle, EngineError>;
}

/// Responder failure. Scoped to a single message by the pipeline.
#[derive(Debug, Error)]
#[error("Responder error: {0}")]
pub struct ResponderError(pub String);

/// External collaborator that turns normalized content into a reply.
#[async_trait]
pub trait Responder: Send + Sync {
    /// `Ok(None)` means the responder had nothing to say.
    async fn respond(&self, content: NormalizedContent) -> Result<Option<String>, ResponderError>;
}
