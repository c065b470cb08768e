//! Core abstractions for the courier messaging-bot runtime.
//!
//! This crate provides the fundamental building blocks:
//! - `TtlCache` / `ConnectionCaches` - Ephemeral caching for the live connection
//! - `EngineEvent` - Typed events emitted by the protocol engine
//! - `NormalizedContent` - The pipeline's hand-off format for responders
//! - Storage, key-store, engine, and responder traits

pub mod cache;
pub mod content;
pub mod events;
pub mod traits;

pub use cache::{ConnectionCaches, TtlCache};
pub use content::{ImageContent, NormalizedContent};
pub use events::{
    CloseReason, ConnectionState, EngineEvent, GroupSnapshot, InboundMessage, MessageBody,
};
pub use traits::{
    BlobStorage, EngineArchive, EngineControl, EngineError, EngineFactory, EngineHandle, KeyStore,
    Responder, ResponderError, SessionState, StorageError, Table,
};
