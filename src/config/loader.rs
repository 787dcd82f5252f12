//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `hashcheck.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, Mode};

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)
    .with_context(|| format!("Invalid config file: {}", path.display()))?;

  info!(
    mode = ?config.mode,
    targets = config.targets.len() + config.hashes.len(),
    workers = config.probe.workers,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse TOML")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - At least one target outside on-demand mode
/// - Non-empty http(s) URLs, no URL configured twice
/// - A positive request timeout
fn validate_config(config: &AppConfig) -> Result<()> {
  let specs = config.target_specs();

  anyhow::ensure!(
    config.mode == Mode::OnDemand || !specs.is_empty(),
    "At least one target must be configured in {:?} mode",
    config.mode
  );

  let mut seen = HashSet::with_capacity(specs.len());
  for (i, spec) in specs.iter().enumerate() {
    anyhow::ensure!(!spec.url.is_empty(), "Target {} has an empty url", i);
    anyhow::ensure!(
      spec.url.starts_with("http://") || spec.url.starts_with("https://"),
      "Target {} ({}) must be an http:// or https:// URL",
      i,
      spec.url
    );
    anyhow::ensure!(
      seen.insert(spec.url.as_str()),
      "Target {} is configured more than once",
      spec.url
    );
  }

  anyhow::ensure!(
    config.probe.timeout_seconds > 0,
    "probe.timeout_seconds must be positive"
  );

  Ok(())
}
