//! Watcher - Long-lived Target Set for the Persistent Mode
//!
//! Owns one [`WatchedTarget`] per configured URL. Each target keeps
//! its digest history and a permanent set of metric handles bound
//! into a registry that is built once at startup. Probe cycles only
//! mutate handle values.
//!
//! Cycles are serialized: two overlapping scrapes never interleave
//! change detection on the same target.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::probe::record_outcome;
use super::scheduler::ProbeScheduler;
use crate::adapters::metrics::prometheus::{MetricSet, TargetSeries};
use crate::domain::{Observation, TargetSpec, TargetState};
use crate::ports::Fetcher;

/// Mutable part of a watched target.
struct Tracked {
    state: TargetState,
    series: TargetSeries,
    last: Observation,
}

/// A configured target with persistent state and metric handles.
pub struct WatchedTarget {
    url: String,
    tracked: Mutex<Tracked>,
}

impl WatchedTarget {
    fn new(metrics: &MetricSet, spec: TargetSpec) -> prometheus::Result<Self> {
        let series = metrics.bind(&spec)?;
        let state = TargetState::new(spec);
        let last = state.quiescent();
        series.publish(&last);
        Ok(Self {
            url: state.spec().url.clone(),
            tracked: Mutex::new(Tracked { state, series, last }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current target definition.
    pub fn spec(&self) -> TargetSpec {
        self.lock().state.spec().clone()
    }

    /// Observation published by the latest cycle.
    pub fn last_observation(&self) -> Observation {
        self.lock().last.clone()
    }

    /// Probe once: publish failure defaults, fetch, publish the result.
    pub async fn probe(&self, fetcher: &dyn Fetcher) -> Observation {
        {
            let mut tracked = self.lock();
            let quiescent = tracked.state.quiescent();
            tracked.series.publish(&quiescent);
            tracked.last = quiescent;
        }

        let outcome = fetcher.fetch(&self.url).await;

        let mut tracked = self.lock();
        let obs = record_outcome(&mut tracked.state, outcome);
        tracked.series.publish(&obs);
        tracked.last = obs.clone();
        obs
    }

    fn set_expected(&self, metrics: &MetricSet, expected: Option<String>) -> prometheus::Result<()> {
        let mut tracked = self.lock();
        let mut state = tracked.state.clone();
        state.set_expected(expected);
        let series = metrics.bind(state.spec())?;

        metrics.unbind_correct(&tracked.series);
        let last = state.reverify(&tracked.last);
        series.publish(&last);
        tracked.state = state;
        tracked.series = series;
        tracked.last = last;
        Ok(())
    }

    fn unbind(&self, metrics: &MetricSet) {
        metrics.unbind(&self.lock().series);
    }
}

/// Outcome of reconciling the target set with a new configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Newly added URLs.
    pub added: usize,
    /// URLs no longer configured.
    pub removed: usize,
    /// URLs whose expected digest changed.
    pub updated: usize,
}

impl ReloadSummary {
    /// Whether anything changed.
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

/// The persistent target set.
pub struct Watcher {
    fetcher: Arc<dyn Fetcher>,
    scheduler: ProbeScheduler,
    metrics: MetricSet,
    targets: RwLock<Vec<Arc<WatchedTarget>>>,
    cycle: tokio::sync::Mutex<()>,
}

impl Watcher {
    /// Bind every spec into `metrics` (already registered by the caller).
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        scheduler: ProbeScheduler,
        metrics: MetricSet,
        specs: Vec<TargetSpec>,
    ) -> prometheus::Result<Self> {
        let targets = specs
            .into_iter()
            .map(|spec| WatchedTarget::new(&metrics, spec).map(Arc::new))
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(Self {
            fetcher,
            scheduler,
            metrics,
            targets: RwLock::new(targets),
            cycle: tokio::sync::Mutex::new(()),
        })
    }

    /// Snapshot of the current targets.
    pub fn targets(&self) -> Vec<Arc<WatchedTarget>> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Target by URL.
    pub fn target(&self, url: &str) -> Option<Arc<WatchedTarget>> {
        self.targets().into_iter().find(|t| t.url() == url)
    }

    /// Probe every target once with bounded parallelism and wait for all.
    ///
    /// Returns the number of completed probes.
    #[instrument(skip(self))]
    pub async fn probe_all(&self) -> usize {
        let _cycle = self.cycle.lock().await;
        let targets = self.targets();
        let fetcher = Arc::clone(&self.fetcher);

        let completed = self
            .scheduler
            .run_all(targets, move |target| {
                let fetcher = Arc::clone(&fetcher);
                async move { target.probe(fetcher.as_ref()).await }
            })
            .await;

        let succeeded = completed.iter().filter(|obs| obs.success).count();
        debug!(completed = completed.len(), succeeded, "Probe cycle complete");
        completed.len()
    }

    /// Replace the configured targets, keeping state for surviving URLs.
    ///
    /// Change counters are keyed by URL and survive a changed expected
    /// digest. Series of removed URLs are dropped from the registry.
    pub fn reconcile(&self, specs: Vec<TargetSpec>) -> prometheus::Result<ReloadSummary> {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        let mut existing: HashMap<String, Arc<WatchedTarget>> = targets
            .iter()
            .map(|t| (t.url.clone(), Arc::clone(t)))
            .collect();

        let mut summary = ReloadSummary::default();
        let mut next = Vec::with_capacity(specs.len());
        for spec in specs {
            match existing.remove(&spec.url) {
                Some(target) => {
                    if target.spec().expected != spec.expected {
                        target.set_expected(&self.metrics, spec.expected)?;
                        summary.updated += 1;
                    }
                    next.push(target);
                }
                None => {
                    next.push(Arc::new(WatchedTarget::new(&self.metrics, spec)?));
                    summary.added += 1;
                }
            }
        }

        for target in existing.into_values() {
            target.unbind(&self.metrics);
            summary.removed += 1;
        }

        *targets = next;
        Ok(summary)
    }

    /// Probe on a fixed interval until shutdown, decoupled from scrapes.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_secs = interval.as_secs(), "Background probing started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Background probing shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use prometheus::Registry;

    use super::*;
    use crate::adapters::metrics::prometheus::{encode, SeriesLayout};
    use crate::domain::{digest, FetchOutcome};

    /// Serves the bodies in order, one per fetch, then repeats the last.
    struct Sequence {
        bodies: Vec<&'static [u8]>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for Sequence {
        async fn fetch(&self, _url: &str) -> FetchOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let body = self.bodies[n.min(self.bodies.len() - 1)];
            FetchOutcome::Complete {
                elapsed: Duration::from_millis(1),
                status: 200,
                body: body.to_vec(),
            }
        }
    }

    fn watcher(bodies: Vec<&'static [u8]>, specs: Vec<TargetSpec>) -> (Watcher, Registry) {
        let registry = Registry::new();
        let metrics = MetricSet::new(SeriesLayout::Persistent).unwrap();
        metrics.register(&registry).unwrap();
        let fetcher = Arc::new(Sequence {
            bodies,
            calls: AtomicUsize::new(0),
        });
        let watcher = Watcher::new(fetcher, ProbeScheduler::new(2), metrics, specs).unwrap();
        (watcher, registry)
    }

    #[tokio::test]
    async fn test_change_count_across_cycles() {
        let (watcher, registry) = watcher(
            vec![b"a", b"a", b"b", b"b", b"a"],
            vec![TargetSpec::observe("http://a")],
        );

        for _ in 0..5 {
            assert_eq!(watcher.probe_all().await, 1);
        }

        let target = watcher.target("http://a").unwrap();
        assert_eq!(target.last_observation().change_count, 2);
        assert!(encode(&registry)
            .unwrap()
            .contains(r#"hashcheck_change_count{target="http://a"} 2"#));
    }

    #[tokio::test]
    async fn test_reconcile_keeps_state_by_url() {
        let (watcher, registry) = watcher(
            vec![b"a", b"b"],
            vec![
                TargetSpec::observe("http://keep"),
                TargetSpec::observe("http://drop"),
            ],
        );
        watcher.probe_all().await;

        let summary = watcher
            .reconcile(vec![
                TargetSpec::new("http://keep", Some(digest(b"b"))),
                TargetSpec::observe("http://new"),
            ])
            .unwrap();
        assert_eq!(
            summary,
            ReloadSummary {
                added: 1,
                removed: 1,
                updated: 1
            }
        );

        let keep = watcher.target("http://keep").unwrap();
        assert!(keep.spec().is_verified());
        assert!(watcher.target("http://drop").is_none());

        let text = encode(&registry).unwrap();
        assert!(!text.contains("http://drop"));
        assert!(text.contains(r#"hashcheck_success{target="http://new"} 0"#));
    }

    #[tokio::test]
    async fn test_new_expected_digest_keeps_last_observation() {
        let (watcher, registry) = watcher(vec![b"a"], vec![TargetSpec::observe("http://a")]);
        watcher.probe_all().await;

        let summary = watcher
            .reconcile(vec![TargetSpec::new("http://a", Some(digest(b"a")))])
            .unwrap();
        assert_eq!(summary.updated, 1);

        let last = watcher.target("http://a").unwrap().last_observation();
        assert!(last.success);
        assert_eq!(last.status_code, 200);
        assert_eq!(last.correct, Some(true));

        let text = encode(&registry).unwrap();
        assert!(text.contains(r#"hashcheck_success{target="http://a"} 1"#));
        assert!(text.contains(r#"hashcheck_status_code{target="http://a"} 200"#));
        assert!(text.contains(&format!(
            r#"hashcheck_correct{{expected="{}",target="http://a"}} 1"#,
            digest(b"a")
        )));

        watcher
            .reconcile(vec![TargetSpec::new("http://a", Some("abcdef".into()))])
            .unwrap();
        let text = encode(&registry).unwrap();
        assert!(text.contains(r#"hashcheck_success{target="http://a"} 1"#));
        assert!(text.contains(r#"hashcheck_correct{expected="abcdef",target="http://a"} 0"#));
        assert!(!text.contains(&format!(r#"expected="{}""#, digest(b"a"))));
    }

    #[tokio::test]
    async fn test_reconcile_unchanged_is_empty() {
        let specs = vec![TargetSpec::observe("http://a")];
        let (watcher, _registry) = watcher(vec![b"a"], specs.clone());
        assert!(watcher.reconcile(specs).unwrap().is_empty());
    }
}
