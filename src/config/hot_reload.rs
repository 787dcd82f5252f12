//! Config Hot-Reload — Re-read hashcheck.toml Periodically
//!
//! Periodically re-reads the config file and, when its content
//! changed and still validates, reconciles the persistent target set.
//! Targets keep their digest history by URL. Mode, listener and
//! worker changes need a restart and are only logged.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::{AppConfig, loader};
use crate::usecases::watcher::Watcher;

/// Polls the config file and applies target changes to a [`Watcher`].
pub struct ConfigWatcher {
    /// Path to the config file.
    config_path: PathBuf,
    /// Time between checks.
    interval: Duration,
    /// Target set to reconcile.
    watcher: Arc<Watcher>,
    /// Config currently applied.
    current: AppConfig,
    /// Hash of the last applied file content.
    last_hash: Option<u64>,
}

impl ConfigWatcher {
    /// Create a config watcher for the already loaded `initial` config.
    pub fn new(
        config_path: impl Into<PathBuf>,
        interval: Duration,
        initial: AppConfig,
        watcher: Arc<Watcher>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            interval,
            watcher,
            current: initial,
            last_hash: None,
        }
    }

    /// Run the config watcher loop until shutdown.
    #[instrument(skip(self, shutdown_rx), fields(path = %self.config_path.display()))]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Config watcher started"
        );

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Config watcher shutting down");
                    return;
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Check if the config changed and apply it if so.
    ///
    /// Returns true when a new config was applied.
    pub async fn check_and_reload(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash.is_none() || new_hash == self.last_hash {
            debug!("Config unchanged");
            return false;
        }

        info!("Config change detected, reloading...");

        let new_config = match loader::load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to reload config, keeping current");
                return false;
            }
        };
        self.last_hash = new_hash;

        if new_config.mode != self.current.mode
            || new_config.probe != self.current.probe
            || new_config.log_level != self.current.log_level
        {
            warn!("Mode, probe and log settings only change on restart");
        }

        match self.watcher.reconcile(new_config.target_specs()) {
            Ok(summary) => {
                info!(
                    added = summary.added,
                    removed = summary.removed,
                    updated = summary.updated,
                    "Config reloaded successfully"
                );
                self.current = new_config;
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to apply reloaded targets");
                false
            }
        }
    }

    /// Hash of the config file contents, for diff detection.
    async fn compute_hash(&self) -> Option<u64> {
        let content = tokio::fs::read_to_string(&self.config_path).await.ok()?;

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}
