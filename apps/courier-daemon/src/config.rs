//! Environment-driven configuration.

use std::{path::PathBuf, time::Duration};

/// Daemon configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Sender ids allowed to trigger the responder; empty means everyone.
    pub allowed_senders: Vec<String>,
    /// Persist groups/messages and serve them back to the engine.
    pub archive_enabled: bool,
    /// Backoff for delayed reconnects.
    pub reconnect_backoff: Duration,
}

impl Config {
    /// Load from environment variables, with defaults for local use.
    #[must_use]
    pub fn from_env() -> Self {
        let database_path = std::env::var("DATABASE_URL")
            .map_or_else(|_| PathBuf::from("data/courier.db"), PathBuf::from);

        let allowed_senders = std::env::var("ALLOWED_SENDERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let archive_enabled = std::env::var("ARCHIVE_ENABLED")
            .map_or(true, |v| v != "0" && !v.eq_ignore_ascii_case("false"));

        let reconnect_backoff = std::env::var("RECONNECT_BACKOFF_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(3), Duration::from_secs);

        Self {
            database_path,
            allowed_senders,
            archive_enabled,
            reconnect_backoff,
        }
    }

    /// Log the effective configuration, the way the operator expects to
    /// confirm it on startup.
    pub fn announce(&self) {
        tracing::info!(database = %self.database_path.display(), "using database");
        tracing::info!(archive_enabled = self.archive_enabled, "archive capability");
        if self.allowed_senders.is_empty() {
            tracing::warn!("no sender restrictions configured");
        } else {
            tracing::info!(senders = ?self.allowed_senders, "responder allow list");
        }
    }
}
