//! Prometheus Metric Set - Probe Observations as Labeled Series
//!
//! All exporter metrics follow the naming convention `hashcheck_*`.
//! A [`MetricSet`] is one composite collector forwarding to its member
//! families, so it registers into a registry as a single unit:
//! - persistent mode registers one set at startup and keeps per-target
//!   handles alive for the life of the process
//! - stateless modes build a fresh set and registry for every scrape

use prometheus::core::{Collector, Desc, MetricVec, MetricVecBuilder};
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::domain::{Observation, TargetSpec};

const TARGET: &str = "target";
const EXPECTED: &str = "expected";
const ACTUAL: &str = "actual";

/// Which families exist and which labels identify a target's series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesLayout {
    /// `target` on every family, `expected` added on `correct`.
    /// Includes duration and change count.
    Persistent,
    /// Same labels as `Persistent`, without duration and change count.
    Static,
    /// `target`, `expected` and `actual` on every family.
    OnDemand,
}

impl SeriesLayout {
    fn base_labels(self) -> &'static [&'static str] {
        match self {
            Self::Persistent | Self::Static => &[TARGET],
            Self::OnDemand => &[TARGET, EXPECTED, ACTUAL],
        }
    }

    fn correct_labels(self) -> &'static [&'static str] {
        match self {
            Self::Persistent | Self::Static => &[TARGET, EXPECTED],
            Self::OnDemand => &[TARGET, EXPECTED, ACTUAL],
        }
    }
}

/// Composite collector holding every `hashcheck_*` family.
#[derive(Clone)]
pub struct MetricSet {
    layout: SeriesLayout,
    /// 1 if the fetch and body read completed, else 0.
    success: GaugeVec,
    /// HTTP status of the last response, 0 without a response.
    status_code: GaugeVec,
    /// Body size of the last response.
    response_bytes: GaugeVec,
    /// Time to response headers (persistent only).
    duration_seconds: Option<GaugeVec>,
    /// Number of observed body changes (persistent only).
    change_count: Option<IntCounterVec>,
    /// 1 if the digest matched the expected value, else 0.
    correct: GaugeVec,
}

impl MetricSet {
    /// Create all families for the given layout. Nothing is registered yet.
    pub fn new(layout: SeriesLayout) -> prometheus::Result<Self> {
        let base = layout.base_labels();

        let success = GaugeVec::new(
            Opts::new(
                "hashcheck_success",
                "Whether the target was fetched and its body read (1=yes, 0=no)",
            ),
            base,
        )?;

        let status_code = GaugeVec::new(
            Opts::new(
                "hashcheck_status_code",
                "HTTP status code of the last response (0 when none arrived)",
            ),
            base,
        )?;

        let response_bytes = GaugeVec::new(
            Opts::new(
                "hashcheck_response_bytes",
                "Size of the last response body in bytes",
            ),
            base,
        )?;

        let correct = GaugeVec::new(
            Opts::new(
                "hashcheck_correct",
                "Whether the body digest matched the expected digest (1=yes, 0=no)",
            ),
            layout.correct_labels(),
        )?;

        let (duration_seconds, change_count) = if layout == SeriesLayout::Persistent {
            let duration = GaugeVec::new(
                Opts::new(
                    "hashcheck_duration_seconds",
                    "Time taken to receive the response headers",
                ),
                base,
            )?;
            let changes = IntCounterVec::new(
                Opts::new(
                    "hashcheck_change_count",
                    "Number of times the body digest changed between probes",
                ),
                base,
            )?;
            (Some(duration), Some(changes))
        } else {
            (None, None)
        };

        Ok(Self {
            layout,
            success,
            status_code,
            response_bytes,
            duration_seconds,
            change_count,
            correct,
        })
    }

    /// Layout this set was built with.
    pub const fn layout(&self) -> SeriesLayout {
        self.layout
    }

    /// Register the whole set as one collector.
    ///
    /// Fails with `AlreadyReg` if the set is already in `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.clone()))
    }

    /// Create the series of one configured target.
    ///
    /// For the on-demand layout use [`MetricSet::bind_on_demand`].
    pub fn bind(&self, spec: &TargetSpec) -> prometheus::Result<TargetSeries> {
        if self.layout == SeriesLayout::OnDemand {
            return self.bind_on_demand(spec, "");
        }
        let base = vec![spec.url.clone()];
        let correct = spec
            .expected
            .as_ref()
            .map(|expected| vec![spec.url.clone(), expected.clone()]);
        self.bind_labels(base, correct)
    }

    /// Create the series of an on-demand target whose computed digest is
    /// `actual` (empty when no digest was computed).
    pub fn bind_on_demand(
        &self,
        spec: &TargetSpec,
        actual: &str,
    ) -> prometheus::Result<TargetSeries> {
        let labels = vec![
            spec.url.clone(),
            spec.expected.clone().unwrap_or_default(),
            actual.to_string(),
        ];
        let correct = spec.expected.as_ref().map(|_| labels.clone());
        self.bind_labels(labels, correct)
    }

    fn bind_labels(
        &self,
        base: Vec<String>,
        correct_labels: Option<Vec<String>>,
    ) -> prometheus::Result<TargetSeries> {
        let values: Vec<&str> = base.iter().map(String::as_str).collect();

        let success = self.success.get_metric_with_label_values(&values)?;
        let status_code = self.status_code.get_metric_with_label_values(&values)?;
        let response_bytes = self.response_bytes.get_metric_with_label_values(&values)?;
        let duration_seconds = self
            .duration_seconds
            .as_ref()
            .map(|vec| vec.get_metric_with_label_values(&values))
            .transpose()?;
        let change_count = self
            .change_count
            .as_ref()
            .map(|vec| vec.get_metric_with_label_values(&values))
            .transpose()?;
        let correct = correct_labels
            .as_ref()
            .map(|labels| {
                let values: Vec<&str> = labels.iter().map(String::as_str).collect();
                self.correct.get_metric_with_label_values(&values)
            })
            .transpose()?;

        Ok(TargetSeries {
            base_labels: base,
            correct_labels,
            success,
            status_code,
            response_bytes,
            duration_seconds,
            change_count,
            correct,
        })
    }

    /// Remove every series belonging to `series` from this set.
    pub fn unbind(&self, series: &TargetSeries) {
        let values: Vec<&str> = series.base_labels.iter().map(String::as_str).collect();
        forget(&self.success, &values);
        forget(&self.status_code, &values);
        forget(&self.response_bytes, &values);
        if let Some(vec) = &self.duration_seconds {
            forget(vec, &values);
        }
        if let Some(vec) = &self.change_count {
            forget(vec, &values);
        }
        self.unbind_correct(series);
    }

    /// Remove only the `correct` series of `series`.
    pub fn unbind_correct(&self, series: &TargetSeries) {
        if let Some(labels) = &series.correct_labels {
            let values: Vec<&str> = labels.iter().map(String::as_str).collect();
            forget(&self.correct, &values);
        }
    }

    fn families(&self) -> Vec<&dyn Collector> {
        let mut families: Vec<&dyn Collector> = vec![
            &self.success,
            &self.status_code,
            &self.response_bytes,
            &self.correct,
        ];
        if let Some(vec) = &self.duration_seconds {
            families.push(vec);
        }
        if let Some(vec) = &self.change_count {
            families.push(vec);
        }
        families
    }
}

impl Collector for MetricSet {
    fn desc(&self) -> Vec<&Desc> {
        self.families().into_iter().flat_map(|c| c.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families().into_iter().flat_map(|c| c.collect()).collect()
    }
}

/// Remove one child of `family`. Returns whether it existed.
///
/// A missing child is expected (already removed); any other error
/// means the label values do not fit the family and is logged.
fn forget<T: MetricVecBuilder>(family: &MetricVec<T>, values: &[&str]) -> bool {
    match family.remove_label_values(values) {
        Ok(()) => true,
        Err(prometheus::Error::Msg(_)) => false,
        Err(e) => {
            warn!(error = %e, labels = ?values, "Failed to remove metric series");
            false
        }
    }
}

/// Metric handles of one target inside a [`MetricSet`].
#[derive(Clone)]
pub struct TargetSeries {
    base_labels: Vec<String>,
    correct_labels: Option<Vec<String>>,
    success: Gauge,
    status_code: Gauge,
    response_bytes: Gauge,
    duration_seconds: Option<Gauge>,
    change_count: Option<IntCounter>,
    correct: Option<Gauge>,
}

impl TargetSeries {
    /// Write an observation into the handles.
    ///
    /// The change counter only ever moves forward to `obs.change_count`.
    #[allow(clippy::cast_precision_loss)]
    pub fn publish(&self, obs: &Observation) {
        self.success.set(f64::from(u8::from(obs.success)));
        self.status_code.set(f64::from(obs.status_code));
        self.response_bytes.set(obs.response_bytes as f64);

        if let Some(gauge) = &self.duration_seconds {
            gauge.set(obs.duration.as_secs_f64());
        }
        if let Some(counter) = &self.change_count {
            let delta = obs.change_count.saturating_sub(counter.get());
            if delta > 0 {
                counter.inc_by(delta);
            }
        }
        if let (Some(gauge), Some(correct)) = (&self.correct, obs.correct) {
            gauge.set(f64::from(u8::from(correct)));
        }
    }

    /// Whether this target has a `correct` series.
    pub const fn is_verified(&self) -> bool {
        self.correct.is_some()
    }
}

/// Fresh registry preloaded with the process collector.
///
/// Process metrics (`process_*`) are read from `/proc` and only exist
/// on Linux; elsewhere the registry starts empty.
pub fn base_registry() -> prometheus::Result<Registry> {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

    Ok(registry)
}

/// Content type of [`encode`] output.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Gather `registry` and render it in the Prometheus text format.
pub fn encode(registry: &Registry) -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn observation(success: bool, correct: Option<bool>, changes: u64) -> Observation {
        Observation {
            success,
            status_code: 200,
            response_bytes: 4,
            duration: Duration::from_millis(250),
            digest: Some("ab".into()),
            correct,
            change_count: changes,
            changed: false,
        }
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = Registry::new();
        let set = MetricSet::new(SeriesLayout::Static).unwrap();
        set.register(&registry).unwrap();
        assert!(set.register(&registry).is_err());
    }

    #[test]
    fn test_correct_only_for_verified_targets() {
        let registry = Registry::new();
        let set = MetricSet::new(SeriesLayout::Persistent).unwrap();
        set.register(&registry).unwrap();

        let plain = set.bind(&TargetSpec::observe("http://plain")).unwrap();
        let verified = set
            .bind(&TargetSpec::new("http://verified", Some("ABC".into())))
            .unwrap();
        plain.publish(&observation(true, None, 0));
        verified.publish(&observation(true, Some(true), 0));

        let text = encode(&registry).unwrap();
        assert!(text.contains(r#"hashcheck_correct{expected="ABC",target="http://verified"} 1"#));
        assert!(!text.contains(r#"hashcheck_correct{expected="",target="http://plain"}"#));
        assert!(text.contains(r#"hashcheck_success{target="http://plain"} 1"#));
        assert!(text.contains(r#"hashcheck_duration_seconds{target="http://plain"} 0.25"#));
    }

    #[test]
    fn test_static_layout_omits_timing_and_changes() {
        let registry = Registry::new();
        let set = MetricSet::new(SeriesLayout::Static).unwrap();
        set.register(&registry).unwrap();
        set.bind(&TargetSpec::observe("http://a"))
            .unwrap()
            .publish(&observation(true, None, 3));

        let text = encode(&registry).unwrap();
        assert!(!text.contains("hashcheck_duration_seconds"));
        assert!(!text.contains("hashcheck_change_count"));
        assert!(text.contains(r#"hashcheck_status_code{target="http://a"} 200"#));
    }

    #[test]
    fn test_change_counter_is_monotonic() {
        let registry = Registry::new();
        let set = MetricSet::new(SeriesLayout::Persistent).unwrap();
        set.register(&registry).unwrap();
        let series = set.bind(&TargetSpec::observe("http://a")).unwrap();

        series.publish(&observation(true, None, 2));
        series.publish(&observation(false, None, 1));

        let text = encode(&registry).unwrap();
        assert!(text.contains(r#"hashcheck_change_count{target="http://a"} 2"#));
    }

    #[test]
    fn test_on_demand_labels() {
        let registry = Registry::new();
        let set = MetricSet::new(SeriesLayout::OnDemand).unwrap();
        set.register(&registry).unwrap();
        let spec = TargetSpec::new("http://a", Some("abcdef".into()));
        set.bind_on_demand(&spec, "1234")
            .unwrap()
            .publish(&observation(true, Some(false), 0));

        let text = encode(&registry).unwrap();
        assert!(text.contains(
            r#"hashcheck_success{actual="1234",expected="abcdef",target="http://a"} 1"#
        ));
        assert!(text.contains(
            r#"hashcheck_correct{actual="1234",expected="abcdef",target="http://a"} 0"#
        ));
    }

    #[test]
    fn test_unbind_removes_series() {
        let registry = Registry::new();
        let set = MetricSet::new(SeriesLayout::Persistent).unwrap();
        set.register(&registry).unwrap();
        let series = set
            .bind(&TargetSpec::new("http://gone", Some("ab".into())))
            .unwrap();
        series.publish(&observation(true, Some(true), 0));
        set.unbind(&series);

        assert!(!encode(&registry).unwrap().contains("http://gone"));
    }

    #[test]
    fn test_forget_reports_missing_and_mismatched_series() {
        let set = MetricSet::new(SeriesLayout::Static).unwrap();
        set.bind(&TargetSpec::observe("http://a")).unwrap();

        assert!(forget(&set.success, &["http://a"]));
        assert!(!forget(&set.success, &["http://a"]));
        assert!(!forget(&set.success, &["http://a", "extra"]));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_base_registry_has_process_metrics() {
        let text = encode(&base_registry().unwrap()).unwrap();
        assert!(text.contains("process_resident_memory_bytes"));
        assert!(text.contains("process_threads"));
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn test_base_registry_is_empty_off_linux() {
        assert!(base_registry().unwrap().gather().is_empty());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(), "text/plain; version=0.0.4");
    }
}
