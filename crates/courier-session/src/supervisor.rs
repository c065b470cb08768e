//! Connection supervision: engine lifecycle, event wiring, reconnect policy.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use bytes::Bytes;
use courier_core::{
    cache::ConnectionCaches,
    events::{CloseReason, ConnectionState, EngineEvent},
    traits::{EngineArchive, EngineFactory, SessionState},
};
use courier_store::{CachedKeyStore, CredentialStore};

use crate::{
    pipeline::IngestionPipeline,
    reconnect::{RestartPolicy, restart_policy},
};

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No connection attempt in progress; the next one starts from here.
    Idle,
    Connecting,
    Open,
    Closing,
    /// A terminal close was classified; the loop has exited.
    Terminated,
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wait before retrying after a transport failure or unrecognized close.
    pub reconnect_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(3),
        }
    }
}

/// Why the supervisor stopped. The only way out of the reconnect loop.
#[derive(Debug)]
pub enum SupervisorExit {
    /// Re-pairing required; the process should exit non-zero.
    Terminal(CloseReason),
}

/// Decision taken after one connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Restart {
    Immediate,
    Delayed,
    Terminal(CloseReason),
}

/// Factory for a fresh root credential blob when none is stored.
pub type CredentialFactory = Box<dyn Fn() -> Bytes + Send + Sync>;

/// Owns the protocol engine's lifecycle: constructs it with current
/// credential state, wires its events to the credential store and the
/// ingestion pipeline, classifies disconnects, and drives the restart loop.
pub struct ConnectionSupervisor {
    factory: Arc<dyn EngineFactory>,
    credentials: Arc<CredentialStore>,
    fresh_credentials: CredentialFactory,
    caches: Arc<ConnectionCaches>,
    pipeline: Arc<IngestionPipeline>,
    archive: Arc<dyn EngineArchive>,
    config: SupervisorConfig,
    state: RwLock<SupervisorState>,
}

impl ConnectionSupervisor {
    #[must_use]
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        credentials: Arc<CredentialStore>,
        fresh_credentials: CredentialFactory,
        pipeline: Arc<IngestionPipeline>,
        archive: Arc<dyn EngineArchive>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            factory,
            credentials,
            fresh_credentials,
            caches: Arc::new(ConnectionCaches::new()),
            pipeline,
            archive,
            config,
            state: RwLock::new(SupervisorState::Idle),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.read().unwrap()
    }

    fn set_state(&self, next: SupervisorState) {
        let mut state = self.state.write().unwrap();
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "supervisor state change");
            *state = next;
        }
    }

    /// Run the reconnect loop until a terminal close is classified.
    ///
    /// In-flight message tasks keep running across restarts and backoff
    /// waits; only the connection itself is cycled.
    pub async fn run(&self) -> SupervisorExit {
        loop {
            match self.run_connection().await {
                Restart::Immediate => {
                    tracing::info!("restarting connection with no delay");
                }
                Restart::Delayed => {
                    tracing::info!(
                        backoff_ms = self.config.reconnect_backoff.as_millis() as u64,
                        "restarting connection after backoff"
                    );
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                }
                Restart::Terminal(reason) => {
                    tracing::error!(%reason, "terminal disconnect, clearing credentials");
                    self.credentials.clear_all().await;
                    self.set_state(SupervisorState::Terminated);
                    return SupervisorExit::Terminal(reason);
                }
            }
            self.set_state(SupervisorState::Idle);
        }
    }

    /// Drive one connection from construction to its close event.
    async fn run_connection(&self) -> Restart {
        self.set_state(SupervisorState::Connecting);
        self.caches.flush_all();

        let credentials = self
            .credentials
            .load_or_init(|| (self.fresh_credentials)())
            .await;
        let keys = Arc::new(CachedKeyStore::new(
            Arc::clone(&self.credentials),
            Arc::clone(&self.caches.session_keys),
        ));

        let session = SessionState { credentials, keys };
        let mut handle = match self
            .factory
            .connect(session, Arc::clone(&self.archive), Arc::clone(&self.caches))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "engine construction failed");
                self.caches.flush_all();
                return Restart::Delayed;
            }
        };

        while let Some(event) = handle.events.recv().await {
            match event {
                EngineEvent::ConnectionState(ConnectionState::Connecting) => {
                    tracing::debug!("engine negotiating connection");
                }
                EngineEvent::ConnectionState(ConnectionState::Open) => {
                    self.set_state(SupervisorState::Open);
                    tracing::info!("connection open");
                }
                EngineEvent::ConnectionState(ConnectionState::Closed { reason }) => {
                    self.set_state(SupervisorState::Closing);
                    self.caches.flush_all();
                    let policy = restart_policy(&reason);
                    tracing::info!(%reason, ?policy, "connection closed");
                    return match policy {
                        RestartPolicy::Terminal => Restart::Terminal(reason),
                        RestartPolicy::Immediate => Restart::Immediate,
                        RestartPolicy::Delayed => Restart::Delayed,
                    };
                }
                EngineEvent::QrChallenge(code) => {
                    // Operator-facing; pairing does not change supervisor state.
                    match render_qr(&code) {
                        Some(qr) => tracing::info!(
                            "pairing challenge received, scan to authorize:\n{qr}"
                        ),
                        None => tracing::info!(%code, "pairing challenge received"),
                    }
                }
                EngineEvent::CredentialsUpdated(blob) => {
                    self.credentials.save_credentials(blob).await;
                }
                EngineEvent::MessagesReceived(messages)
                | EngineEvent::HistoryBatch(messages) => {
                    for message in messages {
                        let pipeline = Arc::clone(&self.pipeline);
                        let control = Arc::clone(&handle.control);
                        tokio::spawn(async move {
                            pipeline.handle_message(control, message).await;
                        });
                    }
                }
                EngineEvent::GroupsUpdated(groups) => {
                    for group in groups {
                        let pipeline = Arc::clone(&self.pipeline);
                        tokio::spawn(async move {
                            pipeline.handle_group(group).await;
                        });
                    }
                }
            }
        }

        // The engine dropped its event stream without a close event; treat
        // it like an unrecognized close.
        tracing::warn!("engine event stream ended without a close event");
        self.set_state(SupervisorState::Closing);
        self.caches.flush_all();
        Restart::Delayed
    }
}

/// Render a pairing challenge as a terminal-scannable QR code.
///
/// `None` when the payload cannot be encoded; the caller falls back to the
/// raw string.
fn render_qr(code: &str) -> Option<String> {
    let qr = qrcode::QrCode::new(code.as_bytes()).ok()?;
    Some(
        qr.render::<qrcode::render::unicode::Dense1x2>()
            .quiet_zone(true)
            .build(),
    )
}
