//! Inbound-event ingestion: durable records plus responder round-trips.

use std::sync::Arc;

use courier_core::{
    content::NormalizedContent,
    events::{GroupSnapshot, InboundMessage, MessageBody},
    traits::{EngineControl, Responder},
};
use courier_store::MessageArchive;

/// Reply sent when the image bytes could not be fetched.
pub const MEDIA_FALLBACK: &str = "Sorry, I was unable to process the image.";
/// Reply sent when the responder had nothing to say.
pub const NO_RESPONSE_FALLBACK: &str = "Sorry, there is no response available right now.";
/// Reply sent when the responder failed.
pub const ERROR_FALLBACK: &str = "Sorry, there was an error processing your request.";

/// Pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Sender ids permitted to trigger the responder. Empty means everyone.
    pub allow_list: Vec<String>,
    /// Persist groups/messages and serve them back to the engine. The
    /// reduced-capability deployment turns this off.
    pub archive_enabled: bool,
}

/// Turns inbound protocol events into durable records and, for messages,
/// into a responder round-trip.
///
/// Every failure is scoped to the one event being handled: nothing here
/// returns an error, and a slow or failing responder never delays
/// persistence of the envelope.
pub struct IngestionPipeline {
    archive: Arc<MessageArchive>,
    responder: Arc<dyn Responder>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        archive: Arc<MessageArchive>,
        responder: Arc<dyn Responder>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            archive,
            responder,
            config,
        }
    }

    /// Upsert a group snapshot; last write wins.
    pub async fn handle_group(&self, snapshot: GroupSnapshot) {
        if !self.config.archive_enabled {
            return;
        }
        self.archive.upsert_group(&snapshot).await;
    }

    /// Handle one inbound message end to end.
    pub async fn handle_message(&self, control: Arc<dyn EngineControl>, message: InboundMessage) {
        let (Some(conversation_id), Some(message_id)) =
            (message.conversation_id.clone(), message.message_id.clone())
        else {
            tracing::debug!("dropping message without conversation or message id");
            return;
        };

        if message.from_self {
            tracing::trace!(%conversation_id, %message_id, "ignoring self-originated message");
            return;
        }

        // Persistence must not wait on (or be failed by) the responder.
        let persist = async {
            if self.config.archive_enabled {
                self.archive
                    .upsert_message(&conversation_id, &message_id, message.raw.clone())
                    .await;
            }
        };
        let respond = self.respond(&control, &message, &conversation_id, &message_id);
        tokio::join!(persist, respond);
    }

    async fn respond(
        &self,
        control: &Arc<dyn EngineControl>,
        message: &InboundMessage,
        conversation_id: &str,
        message_id: &str,
    ) {
        if let Some(sender) = &message.sender {
            if !self.config.allow_list.is_empty() && !self.config.allow_list.contains(sender) {
                tracing::info!(%sender, "sender not in allow list, skipping responder");
                return;
            }
        }

        let content = match &message.body {
            MessageBody::Text(text) => NormalizedContent::text(text.clone()),
            MessageBody::Image { mime_type, caption } => {
                match control.fetch_media(message).await {
                    Ok(bytes) => NormalizedContent::image(
                        &bytes,
                        mime_type.clone().unwrap_or_else(|| "image/jpeg".to_string()),
                        caption.clone(),
                    ),
                    Err(e) => {
                        tracing::error!(%conversation_id, %message_id, error = %e, "media fetch failed");
                        // Still acknowledge the message before falling back.
                        if let Err(e) = control.mark_read(conversation_id, message_id).await {
                            tracing::debug!(error = %e, "mark-read failed");
                        }
                        self.send_reply(control, conversation_id, message_id, MEDIA_FALLBACK)
                            .await;
                        return;
                    }
                }
            }
            MessageBody::Empty => {
                tracing::debug!(%conversation_id, %message_id, "no actionable content");
                return;
            }
        };

        // Read receipt and presence are best-effort.
        if let Err(e) = control.mark_read(conversation_id, message_id).await {
            tracing::debug!(error = %e, "mark-read failed");
        }
        if let Err(e) = control.announce_presence(conversation_id).await {
            tracing::debug!(error = %e, "presence announce failed");
        }

        match self.responder.respond(content).await {
            Ok(Some(reply)) => {
                self.send_reply(control, conversation_id, message_id, &reply)
                    .await;
            }
            Ok(None) => {
                tracing::info!(%conversation_id, %message_id, "responder produced no reply");
                self.send_reply(control, conversation_id, message_id, NO_RESPONSE_FALLBACK)
                    .await;
            }
            Err(e) => {
                tracing::error!(%conversation_id, %message_id, error = %e, "responder failed");
                self.send_reply(control, conversation_id, message_id, ERROR_FALLBACK)
                    .await;
            }
        }
    }

    async fn send_reply(
        &self,
        control: &Arc<dyn EngineControl>,
        conversation_id: &str,
        message_id: &str,
        text: &str,
    ) {
        if let Err(e) = control
            .send_text(conversation_id, text, Some(message_id))
            .await
        {
            tracing::warn!(%conversation_id, error = %e, "reply send failed");
        }
    }
}
