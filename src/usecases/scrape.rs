//! Scrape Orchestration - Probe, Then Render
//!
//! One [`Exporter`] per process, shaped by the configured mode:
//! - `Persistent`: long-lived targets and a registry built at startup;
//!   a scrape probes (unless a background interval is running) and
//!   renders the shared registry
//! - `Static`: configured targets, but a fresh state, metric set and
//!   registry for every scrape
//! - `OnDemand`: the target and expected digest come from the query
//!   string; fresh registry per scrape

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::probe::probe_target;
use super::scheduler::{effective_workers, ProbeScheduler};
use super::watcher::Watcher;
use crate::adapters::metrics::prometheus::{base_registry, encode, MetricSet, SeriesLayout};
use crate::config::{AppConfig, Mode};
use crate::domain::{TargetSpec, TargetState};
use crate::ports::Fetcher;

/// Query parameters accepted by `/metrics`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeQuery {
    /// URL to probe (on-demand mode).
    pub target: Option<String>,
    /// Expected digest (on-demand mode).
    pub hash: Option<String>,
}

/// Errors surfaced to the scraper.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// A required query parameter is missing or empty.
    #[error("missing required query parameter: {0}")]
    MissingParameter(&'static str),
    /// Metric registration or encoding failed.
    #[error("failed to render metrics: {0}")]
    Render(#[from] prometheus::Error),
}

impl ScrapeError {
    /// Whether the scraper, not the exporter, is at fault.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingParameter(_))
    }
}

/// Mode-specific scrape pipeline.
pub enum Exporter {
    /// Long-lived targets with permanent metric handles.
    Persistent {
        /// Target set.
        watcher: Arc<Watcher>,
        /// Registry built once at startup.
        registry: Registry,
        /// Probe on every scrape; false when a background interval runs.
        probe_on_scrape: bool,
    },
    /// Configured targets, nothing kept between scrapes.
    Static {
        /// Fetch port.
        fetcher: Arc<dyn Fetcher>,
        /// Worker pool bound.
        scheduler: ProbeScheduler,
        /// Configured targets.
        targets: Arc<[TargetSpec]>,
    },
    /// Target supplied per request.
    OnDemand {
        /// Fetch port.
        fetcher: Arc<dyn Fetcher>,
    },
}

impl Exporter {
    /// Build the pipeline described by `config`.
    pub fn from_config(config: &AppConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let scheduler = ProbeScheduler::new(effective_workers(config.probe.workers));

        match config.mode {
            Mode::Persistent => {
                let interval = config.probe.interval();
                Self::persistent(fetcher, scheduler, config.target_specs(), interval.is_none())
            }
            Mode::Static => Ok(Self::Static {
                fetcher,
                scheduler,
                targets: config.target_specs().into(),
            }),
            Mode::OnDemand => Ok(Self::OnDemand { fetcher }),
        }
    }

    /// Persistent exporter with its registry built and populated.
    pub fn persistent(
        fetcher: Arc<dyn Fetcher>,
        scheduler: ProbeScheduler,
        specs: Vec<TargetSpec>,
        probe_on_scrape: bool,
    ) -> Result<Self> {
        let registry = base_registry().context("Failed to create metrics registry")?;
        let metrics =
            MetricSet::new(SeriesLayout::Persistent).context("Failed to create metric set")?;
        metrics
            .register(&registry)
            .context("Failed to register metric set")?;
        let watcher = Watcher::new(fetcher, scheduler, metrics, specs)
            .context("Failed to bind target metrics")?;

        Ok(Self::Persistent {
            watcher: Arc::new(watcher),
            registry,
            probe_on_scrape,
        })
    }

    /// Mode this exporter runs in.
    pub const fn mode(&self) -> Mode {
        match self {
            Self::Persistent { .. } => Mode::Persistent,
            Self::Static { .. } => Mode::Static,
            Self::OnDemand { .. } => Mode::OnDemand,
        }
    }

    /// Target set of the persistent mode.
    pub fn watcher(&self) -> Option<Arc<Watcher>> {
        match self {
            Self::Persistent { watcher, .. } => Some(Arc::clone(watcher)),
            _ => None,
        }
    }

    /// Serve one scrape: probe as the mode requires, then render.
    #[instrument(skip(self, query), fields(mode = ?self.mode()))]
    pub async fn scrape(&self, query: &ProbeQuery) -> Result<String, ScrapeError> {
        match self {
            Self::Persistent {
                watcher,
                registry,
                probe_on_scrape,
            } => {
                if *probe_on_scrape {
                    debug!("Probing");
                    watcher.probe_all().await;
                }
                debug!("Rendering");
                Ok(encode(registry)?)
            }
            Self::Static {
                fetcher,
                scheduler,
                targets,
            } => Self::scrape_static(fetcher, *scheduler, targets).await,
            Self::OnDemand { fetcher } => Self::scrape_on_demand(fetcher.as_ref(), query).await,
        }
    }

    async fn scrape_static(
        fetcher: &Arc<dyn Fetcher>,
        scheduler: ProbeScheduler,
        targets: &[TargetSpec],
    ) -> Result<String, ScrapeError> {
        debug!(targets = targets.len(), "Probing");
        let states: Vec<TargetState> = targets.iter().cloned().map(TargetState::new).collect();
        let fetcher = Arc::clone(fetcher);
        let observed = scheduler
            .run_all(states, move |mut state| {
                let fetcher = Arc::clone(&fetcher);
                async move {
                    let obs = probe_target(fetcher.as_ref(), &mut state).await;
                    (state, obs)
                }
            })
            .await;

        debug!("Rendering");
        let registry = base_registry()?;
        let metrics = MetricSet::new(SeriesLayout::Static)?;
        metrics.register(&registry)?;
        for (state, obs) in &observed {
            metrics.bind(state.spec())?.publish(obs);
        }
        Ok(encode(&registry)?)
    }

    async fn scrape_on_demand(
        fetcher: &dyn Fetcher,
        query: &ProbeQuery,
    ) -> Result<String, ScrapeError> {
        let spec = on_demand_spec(query)?;

        debug!(url = %spec.url, "Probing");
        let mut state = TargetState::new(spec);
        let obs = probe_target(fetcher, &mut state).await;

        debug!("Rendering");
        let registry = base_registry()?;
        let metrics = MetricSet::new(SeriesLayout::OnDemand)?;
        metrics.register(&registry)?;
        metrics
            .bind_on_demand(state.spec(), obs.digest.as_deref().unwrap_or_default())?
            .publish(&obs);
        Ok(encode(&registry)?)
    }
}

/// Validate on-demand parameters; the expected digest is lowercased.
fn on_demand_spec(query: &ProbeQuery) -> Result<TargetSpec, ScrapeError> {
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let target = present(&query.target).ok_or(ScrapeError::MissingParameter("target"))?;
    let hash = present(&query.hash).ok_or(ScrapeError::MissingParameter("hash"))?;
    Ok(TargetSpec::new(target, Some(hash.to_lowercase())))
}
