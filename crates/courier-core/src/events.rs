//! Typed events emitted by the protocol engine.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Coded explanation for why the live connection ended.
///
/// These mirror the close codes the remote service hands back, plus the two
/// transport-level cases the engine reports itself (`TransportFailure` for a
/// socket that never came up, `Unknown` for anything unclassified).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The session was logged out remotely; stored credentials are invalid.
    LoggedOut,
    /// The service refused the session outright.
    Forbidden,
    /// Device registration no longer matches the account.
    MultideviceMismatch,
    /// The pairing challenge was offered and exhausted without a scan.
    QrAttemptsEnded,
    /// An intermediate proxy timed out during pairing.
    ProxyTimedOut,
    /// The service asked for a plain reconnect.
    RestartRequired,
    ConnectionLost,
    ConnectionClosed,
    ServiceUnavailable,
    /// Another client took over the session.
    ConnectionReplaced,
    TimedOut,
    /// Session state desynchronized; a fresh connection resolves it.
    BadSession,
    /// The socket could not be established at all.
    TransportFailure,
    /// Unclassified close code from the wire.
    Unknown(u16),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Connection lifecycle as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed { reason: CloseReason },
}

/// Body of an inbound message, reduced to what the pipeline can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text, including extended/quoted text bodies.
    Text(String),
    /// An image attachment; the bytes are fetched on demand via the engine.
    Image {
        mime_type: Option<String>,
        caption: Option<String>,
    },
    /// Nothing the pipeline understands (reactions, protocol frames, ...).
    Empty,
}

/// One inbound message envelope.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Conversation the message belongs to. Absent on malformed envelopes.
    pub conversation_id: Option<String>,
    /// Message id within the conversation. Absent on malformed envelopes.
    pub message_id: Option<String>,
    /// Normalized sender identifier, when one could be derived.
    pub sender: Option<String>,
    /// True when this client sent the message itself.
    pub from_self: bool,
    pub body: MessageBody,
    /// The raw serialized envelope, persisted verbatim for retransmission.
    pub raw: Bytes,
}

impl InboundMessage {
    /// Durable row id, `<conversationId>-<messageId>`, when both parts exist.
    #[must_use]
    pub fn record_id(&self) -> Option<String> {
        match (&self.conversation_id, &self.message_id) {
            (Some(conversation), Some(message)) => Some(format!("{conversation}-{message}")),
            _ => None,
        }
    }
}

/// Last-known metadata for a group conversation.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub id: String,
    /// Opaque serialized metadata, stored and served back to the engine as-is.
    pub raw: Bytes,
}

/// Event stream emitted by a live protocol engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConnectionState(ConnectionState),
    /// Out-of-band pairing code to render for the operator.
    QrChallenge(String),
    /// Updated root credential blob; must be persisted before the next restart.
    CredentialsUpdated(Bytes),
    MessagesReceived(Vec<InboundMessage>),
    GroupsUpdated(Vec<GroupSnapshot>),
    /// Backfilled messages from a history sync.
    HistoryBatch(Vec<InboundMessage>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_requires_both_parts() {
        let mut msg = InboundMessage {
            conversation_id: Some("conv1".into()),
            message_id: Some("msg1".into()),
            sender: None,
            from_self: false,
            body: MessageBody::Empty,
            raw: Bytes::new(),
        };
        assert_eq!(msg.record_id().as_deref(), Some("conv1-msg1"));

        msg.message_id = None;
        assert_eq!(msg.record_id(), None);
    }

    #[test]
    fn close_reason_serializes_tagged() {
        let json = serde_json::to_string(&CloseReason::LoggedOut).unwrap();
        assert!(json.contains("logged_out"));

        let parsed: CloseReason = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, CloseReason::LoggedOut);
    }
}
