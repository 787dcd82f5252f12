//! hashcheck-exporter — Entry Point
//!
//! Wiring sequence:
//! 1. Parse CLI flags (--listen, --config)
//! 2. Load hashcheck.toml + validate (fatal on error)
//! 3. Init tracing (JSON structured logging)
//! 4. Create the HTTP fetcher (reqwest + timeout)
//! 5. Build the exporter for the configured mode
//! 6. Spawn background probing and config hot-reload (persistent mode)
//! 7. Bind the listener (fatal on error) and serve /, /metrics, /live
//! 8. Wait for SIGINT → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use hashcheck_exporter::adapters::http::{HttpFetcher, HttpFetcherConfig};
use hashcheck_exporter::adapters::metrics::MetricsServer;
use hashcheck_exporter::config::hot_reload::ConfigWatcher;
use hashcheck_exporter::config::loader;
use hashcheck_exporter::usecases::scrape::Exporter;

/// Prometheus exporter verifying the content digests of HTTP resources.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, env = "HASHCHECK_LISTEN", default_value = "0.0.0.0:9998")]
    listen: String,

    /// Path to the configuration file.
    #[arg(short, long, env = "HASHCHECK_CONFIG", default_value = "./hashcheck.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. CLI flags ────────────────────────────────────────
    let cli = Cli::parse();

    // ── 2. Load configuration ───────────────────────────────
    let config = loader::load_config(&cli.config).context("Failed to load configuration")?;

    // ── 3. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.mode,
        targets = config.target_specs().len(),
        config = %cli.config.display(),
        "Starting hashcheck-exporter"
    );

    // ── 4. HTTP fetcher ─────────────────────────────────────
    let fetcher = Arc::new(
        HttpFetcher::new(HttpFetcherConfig {
            timeout: config.probe.timeout(),
            ..HttpFetcherConfig::default()
        })
        .context("Failed to create HTTP fetcher")?,
    );

    // ── 5. Exporter for the configured mode ─────────────────
    let exporter = Arc::new(Exporter::from_config(&config, fetcher)?);

    // ── 6. Background tasks (persistent mode only) ──────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let mut background = Vec::new();

    if let Some(watcher) = exporter.watcher() {
        if let Some(interval) = config.probe.interval() {
            background.push(tokio::spawn(Arc::clone(&watcher).run(interval, shutdown_tx.subscribe())));
        }
        if let Some(interval) = config.reload.interval() {
            let config_watcher = ConfigWatcher::new(&cli.config, interval, config.clone(), watcher);
            background.push(tokio::spawn(config_watcher.run(shutdown_tx.subscribe())));
        }
    } else if config.probe.interval().is_some() || config.reload.interval().is_some() {
        warn!(mode = ?config.mode, "probe.interval_seconds and reload only apply to persistent mode");
    }

    // ── 7. Bind and serve ───────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("Failed to bind listener on {}", cli.listen))?;

    let server = MetricsServer::new(Arc::clone(&exporter));
    let server_handle = tokio::spawn(server.serve(listener, shutdown_tx.subscribe()));

    info!(address = %cli.listen, "Exporter is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(Duration::from_secs(10), server_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "Metrics server failed"),
        Ok(Err(e)) => error!(error = %e, "Metrics server task panicked"),
        Err(_) => warn!("Metrics server did not stop within 10s"),
    }

    for handle in background {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}
