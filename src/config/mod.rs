//! Configuration Module - TOML-based Exporter Configuration
//!
//! Loads and validates configuration from `hashcheck.toml`.
//! Targets may be given as a `[[targets]]` list, a `[hashes]`
//! url-to-digest table, or both; they are merged into one list.

pub mod hot_reload;
pub mod loader;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::TargetSpec;

/// Top-level exporter configuration.
///
/// Loaded from `hashcheck.toml` at startup. All fields are validated
/// before the exporter starts listening.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
  /// Deployment mode.
  #[serde(default)]
  pub mode: Mode,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Probe scheduling.
  #[serde(default)]
  pub probe: ProbeConfig,
  /// Config hot reload (persistent mode only).
  #[serde(default)]
  pub reload: ReloadConfig,
  /// Targets in list form.
  #[serde(default)]
  pub targets: Vec<TargetEntry>,
  /// Targets in map form: url -> expected digest.
  #[serde(default)]
  pub hashes: BTreeMap<String, String>,
}

/// Where targets come from and whether state persists between scrapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  /// Long-lived targets; registry built once at startup.
  #[default]
  Persistent,
  /// Configured targets; fresh registry per scrape.
  Static,
  /// Target and digest supplied per request as query parameters.
  OnDemand,
}

/// Probe scheduling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
  /// Parallel workers; zero or negative means the default of 3.
  pub workers: i64,
  /// Per-request timeout in seconds.
  pub timeout_seconds: u64,
  /// Background probe interval in seconds (persistent mode).
  /// Zero probes on every scrape instead.
  pub interval_seconds: u64,
}

impl ProbeConfig {
  /// HTTP request timeout.
  pub const fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_seconds)
  }

  /// Background probe interval, if enabled.
  pub fn interval(&self) -> Option<Duration> {
    non_zero_secs(self.interval_seconds)
  }
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      workers: 0,
      timeout_seconds: default_timeout(),
      interval_seconds: 0,
    }
  }
}

/// Hot-reload configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
  /// Re-read the config file periodically.
  pub enabled: bool,
  /// Seconds between checks.
  pub interval_seconds: u64,
}

impl ReloadConfig {
  /// Check interval, if reloading is enabled.
  pub fn interval(&self) -> Option<Duration> {
    if self.enabled {
      non_zero_secs(self.interval_seconds)
    } else {
      None
    }
  }
}

impl Default for ReloadConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      interval_seconds: default_reload_interval(),
    }
  }
}

/// One entry of the `[[targets]]` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
  /// Target URL.
  pub url: String,
  /// Expected digest; empty or absent disables verification.
  #[serde(default)]
  pub hash: Option<String>,
}

impl AppConfig {
  /// All configured targets: list entries first, then map entries
  /// in key order.
  pub fn target_specs(&self) -> Vec<TargetSpec> {
    self
      .targets
      .iter()
      .map(|t| TargetSpec::new(t.url.trim(), t.hash.clone()))
      .chain(
        self
          .hashes
          .iter()
          .map(|(url, hash)| TargetSpec::new(url.trim(), Some(hash.clone()))),
      )
      .collect()
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_timeout() -> u64 {
  10
}

const fn default_reload_interval() -> u64 {
  60
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
  (secs > 0).then(|| Duration::from_secs(secs))
}
