//! Loopback engine for running the daemon without a real protocol library.
//!
//! Emits a scripted conversation after "connecting" and logs outbound
//! replies instead of sending them anywhere. Swap in a real `EngineFactory`
//! implementation to talk to an actual messaging server.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{
    cache::ConnectionCaches,
    events::{ConnectionState, EngineEvent, InboundMessage, MessageBody},
    traits::{EngineArchive, EngineControl, EngineError, EngineFactory, EngineHandle, SessionState},
};
use tokio::sync::mpsc;

pub struct LoopbackFactory;

struct LoopbackControl {
    // Held so the event channel stays open for the life of the connection.
    _events: mpsc::Sender<EngineEvent>,
}

#[async_trait]
impl EngineControl for LoopbackControl {
    async fn send_text(
        &self,
        conversation_id: &str,
        text: &str,
        quote_message_id: Option<&str>,
    ) -> Result<(), EngineError> {
        tracing::info!(%conversation_id, ?quote_message_id, %text, "loopback outbound reply");
        Ok(())
    }

    async fn mark_read(&self, _: &str, message_id: &str) -> Result<(), EngineError> {
        tracing::debug!(%message_id, "loopback mark-read");
        Ok(())
    }

    async fn announce_presence(&self, _: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn fetch_media(&self, _: &InboundMessage) -> Result<Bytes, EngineError> {
        Err(EngineError::MediaFetch("loopback engine has no media".into()))
    }
}

#[async_trait]
impl EngineFactory for LoopbackFactory {
    async fn connect(
        &self,
        session: SessionState,
        _archive: Arc<dyn EngineArchive>,
        _caches: Arc<ConnectionCaches>,
    ) -> Result<EngineHandle, EngineError> {
        tracing::info!(
            credential_bytes = session.credentials.len(),
            "loopback engine connecting"
        );

        let (tx, rx) = mpsc::channel(16);
        let control = Arc::new(LoopbackControl {
            _events: tx.clone(),
        });

        tokio::spawn(async move {
            let _ = tx
                .send(EngineEvent::ConnectionState(ConnectionState::Open))
                .await;
            let _ = tx
                .send(EngineEvent::MessagesReceived(vec![InboundMessage {
                    conversation_id: Some("loopback".to_string()),
                    message_id: Some("msg1".to_string()),
                    sender: Some("operator".to_string()),
                    from_self: false,
                    body: MessageBody::Text("ping".to_string()),
                    raw: Bytes::from_static(b"{\"text\":\"ping\"}"),
                }]))
                .await;
        });

        Ok(EngineHandle {
            control,
            events: rx,
        })
    }
}
