//! courier daemon: wires storage, pipeline, and supervisor together.
//!
//! Run with: cargo run -p courier-daemon
//!
//! Exits 0 on an OS termination signal, non-zero when the connection is
//! closed terminally and re-pairing is required.

mod config;
mod loopback;

use std::{process::ExitCode, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{
    content::NormalizedContent,
    traits::{EngineArchive, EngineFactory, Responder, ResponderError},
};
use courier_session::{
    ConnectionSupervisor, IngestionPipeline, PipelineConfig, SupervisorConfig, SupervisorExit,
};
use courier_store::{CredentialStore, MessageArchive, NullArchive, SqliteStorage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Config, loopback::LoopbackFactory};

/// Placeholder responder: echoes text back. The real deployment plugs an
/// AI collaborator in here.
struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, content: NormalizedContent) -> Result<Option<String>, ResponderError> {
        Ok(content.text.map(|text| format!("echo: {text}")))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    tracing::info!("starting courier");
    let config = Config::from_env();
    config.announce();

    let storage = Arc::new(SqliteStorage::open(&config.database_path).await?);
    let credentials = Arc::new(CredentialStore::new(storage.clone()));
    let archive = Arc::new(MessageArchive::new(storage.clone()));

    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&archive),
        Arc::new(EchoResponder),
        PipelineConfig {
            allow_list: config.allowed_senders.clone(),
            archive_enabled: config.archive_enabled,
        },
    ));

    let engine_archive: Arc<dyn EngineArchive> = if config.archive_enabled {
        archive
    } else {
        Arc::new(NullArchive)
    };

    let supervisor = ConnectionSupervisor::new(
        Arc::new(LoopbackFactory) as Arc<dyn EngineFactory>,
        credentials,
        Box::new(|| Bytes::from_static(b"{}")),
        pipeline,
        engine_archive,
        SupervisorConfig {
            reconnect_backoff: config.reconnect_backoff,
        },
    );

    let code = tokio::select! {
        exit = supervisor.run() => {
            let SupervisorExit::Terminal(reason) = exit;
            tracing::error!(%reason, "terminating: re-pairing required");
            ExitCode::from(1)
        }
        () = shutdown_signal() => {
            tracing::info!("caught termination signal, exiting gracefully");
            ExitCode::SUCCESS
        }
    };

    // Flush durable storage before the process goes away.
    storage.close().await;
    Ok(code)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
