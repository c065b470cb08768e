//! Durable message and group records served back to the engine.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{
    events::GroupSnapshot,
    traits::{BlobStorage, EngineArchive, Table},
};

/// Persists inbound group metadata and raw message envelopes, and answers
/// the engine's read-back queries against them.
///
/// Writes are last-write-wins and, like the credential layer, never let a
/// storage failure escape: a dropped row means at worst a retransmission
/// miss.
pub struct MessageArchive {
    storage: Arc<dyn BlobStorage>,
}

impl MessageArchive {
    #[must_use]
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self { storage }
    }

    fn message_id(conversation_id: &str, message_id: &str) -> String {
        format!("{conversation_id}-{message_id}")
    }

    /// Upsert a group snapshot by id.
    pub async fn upsert_group(&self, snapshot: &GroupSnapshot) {
        if let Err(e) = self
            .storage
            .put(Table::Groups, &snapshot.id, snapshot.raw.clone())
            .await
        {
            tracing::error!(group = %snapshot.id, error = %e, "group upsert failed");
        }
    }

    /// Upsert a raw message envelope under `<conversationId>-<messageId>`.
    pub async fn upsert_message(&self, conversation_id: &str, message_id: &str, raw: Bytes) {
        let id = Self::message_id(conversation_id, message_id);
        if let Err(e) = self.storage.put(Table::Messages, &id, raw).await {
            tracing::error!(message = %id, error = %e, "message upsert failed");
        }
    }

    /// Whether a message row exists, for tests and diagnostics.
    pub async fn has_message(&self, conversation_id: &str, message_id: &str) -> bool {
        let id = Self::message_id(conversation_id, message_id);
        matches!(self.storage.get(Table::Messages, &id).await, Ok(Some(_)))
    }
}

#[async_trait]
impl EngineArchive for MessageArchive {
    async fn cached_group_metadata(&self, group_id: &str) -> Option<Bytes> {
        match self.storage.get(Table::Groups, group_id).await {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(group = group_id, error = %e, "group read failed");
                None
            }
        }
    }

    async fn stored_message(&self, conversation_id: &str, message_id: &str) -> Option<Bytes> {
        let id = Self::message_id(conversation_id, message_id);
        match self.storage.get(Table::Messages, &id).await {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(message = %id, error = %e, "message read failed");
                None
            }
        }
    }
}

/// Archive for the reduced-capability configuration: nothing is persisted,
/// so the engine always sees a miss.
pub struct NullArchive;

#[async_trait]
impl EngineArchive for NullArchive {
    async fn cached_group_metadata(&self, _group_id: &str) -> Option<Bytes> {
        None
    }

    async fn stored_message(&self, _conversation_id: &str, _message_id: &str) -> Option<Bytes> {
        None
    }
}
