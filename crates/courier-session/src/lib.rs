//! Connection supervision and inbound-event ingestion.
//!
//! Provides:
//! - `IngestionPipeline` - Per-event persistence and responder dispatch
//! - `ConnectionSupervisor` - Engine lifecycle, disconnect classification,
//!   reconnect policy

pub mod pipeline;
pub mod reconnect;
pub mod supervisor;

pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use reconnect::{RestartPolicy, restart_policy};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorExit, SupervisorState};
