//! # Metric Sink
//!
//! `PanelMetrics` is the process-wide store of labelled gauges that the panel
//! client writes into and the `/metrics` endpoint reads from.
//!
//! ## Components:
//!
//! - **`PanelMetrics`**: A cloneable handle over a `prometheus::Registry`
//!   holding one `GaugeVec` per panel metric. `reset` drops every label
//!   combination of a metric, which the publish steps rely on to keep
//!   removed inbounds and clients from lingering as stale series. It also
//!   implements `metrics::Recorder`, so the exporter's own counters, recorded
//!   through the `metrics` macros, are registered in the same registry.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) An `axum`-based web server
//!   that exposes the `/metrics` endpoint, optionally behind basic auth.

use metrics::{
    Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

pub mod server;

pub const ONLINE_USERS_COUNT: &str = "online_users_count";
pub const XRAY_VERSION: &str = "xray_version";
pub const PANEL_THREADS: &str = "panel_threads";
pub const PANEL_MEMORY: &str = "panel_memory";
pub const PANEL_UPTIME: &str = "panel_uptime";
pub const INBOUND_UP: &str = "inbound_up";
pub const INBOUND_DOWN: &str = "inbound_down";
pub const CLIENT_UP: &str = "client_up";
pub const CLIENT_DOWN: &str = "client_down";

/// Name, help text and label names of every panel gauge.
const PANEL_GAUGES: &[(&str, &str, &[&str])] = &[
    (ONLINE_USERS_COUNT, "Number of users currently online", &[]),
    (
        XRAY_VERSION,
        "Xray core version, encoded as a number and labelled with the exact version",
        &["version"],
    ),
    (PANEL_THREADS, "Number of threads used by the panel process", &[]),
    (PANEL_MEMORY, "Memory used by the panel process in bytes", &[]),
    (PANEL_UPTIME, "Panel process uptime in seconds", &[]),
    (INBOUND_UP, "Cumulative uploaded bytes per inbound", &["id", "remark"]),
    (INBOUND_DOWN, "Cumulative downloaded bytes per inbound", &["id", "remark"]),
    (CLIENT_UP, "Cumulative uploaded bytes per client", &["id", "email"]),
    (CLIENT_DOWN, "Cumulative downloaded bytes per client", &["id", "email"]),
];

const EXPORTER_COUNTERS: &[(&str, &str)] = &[
    ("xui_exporter_logins_total", "Number of successful panel logins"),
    (
        "xui_exporter_fetch_errors_total",
        "Number of failed panel fetches, labelled by operation",
    ),
    (
        "xui_exporter_cycles_total",
        "Number of collection cycles, labelled by outcome",
    ),
];

/// Labels of one series, sorted by label name.
pub type SeriesLabels = Vec<(String, String)>;

struct Inner {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
    counters: Mutex<HashMap<String, IntCounterVec>>,
    descriptions: Mutex<HashMap<String, String>>,
}

/// The gauge registry shared by the collector and the scrape endpoint.
#[derive(Clone)]
pub struct PanelMetrics {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PanelMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelMetrics").finish_non_exhaustive()
    }
}

impl PanelMetrics {
    /// Creates a registry with every panel gauge registered and empty.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::new();
        for (name, help, labels) in PANEL_GAUGES {
            let gauge = GaugeVec::new(Opts::new(*name, *help), labels)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(*name, gauge);
        }
        let descriptions = EXPORTER_COUNTERS
            .iter()
            .map(|(name, help)| (name.to_string(), help.to_string()))
            .collect();

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                gauges,
                counters: Mutex::new(HashMap::new()),
                descriptions: Mutex::new(descriptions),
            }),
        })
    }

    /// Sets the gauge `name` with the given labels, creating the series if needed.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let Some(gauge) = self.inner.gauges.get(name) else {
            warn!(metric = name, "Ignoring update of an unknown gauge");
            return;
        };
        let labels: HashMap<&str, &str> = labels.iter().copied().collect();
        match gauge.get_metric_with(&labels) {
            Ok(series) => series.set(value),
            Err(e) => warn!(metric = name, error = %e, "Ignoring gauge update with mismatched labels"),
        }
    }

    /// Drops every label combination of the gauge `name`.
    pub fn reset(&self, name: &str) {
        if let Some(gauge) = self.inner.gauges.get(name) {
            gauge.reset();
        }
    }

    /// Value of one series, if it is currently published. Label order does not matter.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let mut wanted: SeriesLabels = labels
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        wanted.sort();
        self.series(name)
            .into_iter()
            .find_map(|(series_labels, value)| (series_labels == wanted).then_some(value))
    }

    /// All currently published series of the gauge `name`, sorted by labels.
    pub fn series(&self, name: &str) -> Vec<(SeriesLabels, f64)> {
        let Some(gauge) = self.inner.gauges.get(name) else {
            return Vec::new();
        };
        let mut series: Vec<(SeriesLabels, f64)> = gauge
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|metric| {
                let mut labels: SeriesLabels = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();
                labels.sort();
                (labels, metric.get_gauge().get_value())
            })
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));
        series
    }

    /// Renders every registered metric in the Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Looks up or registers the counter family behind a `metrics` key.
    fn counter(&self, key: &Key) -> prometheus::Result<IntCounter> {
        let name = key.name();
        let (label_names, label_values): (Vec<&str>, Vec<&str>) =
            key.labels().map(|label| (label.key(), label.value())).unzip();

        let mut counters = self
            .inner
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(family) = counters.get(name) {
            return family.get_metric_with_label_values(&label_values);
        }

        let help = self
            .inner
            .descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string());
        let family = IntCounterVec::new(Opts::new(name, help), &label_names)?;
        self.inner.registry.register(Box::new(family.clone()))?;
        let counter = family.get_metric_with_label_values(&label_values)?;
        counters.insert(name.to_string(), family);
        Ok(counter)
    }
}

/// Adapts a prometheus counter to the `metrics` counter handle.
struct CounterHandle(IntCounter);

impl CounterFn for CounterHandle {
    fn increment(&self, value: u64) {
        self.0.inc_by(value);
    }

    fn absolute(&self, value: u64) {
        let current = self.0.get();
        if value > current {
            self.0.inc_by(value - current);
        }
    }
}

impl Recorder for PanelMetrics {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.inner
            .descriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_str().to_string(), description.to_string());
    }

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        match self.counter(key) {
            Ok(counter) => Counter::from_arc(Arc::new(CounterHandle(counter))),
            Err(e) => {
                warn!(metric = key.name(), error = %e, "Failed to register counter");
                Counter::noop()
            }
        }
    }

    // Only counters are recorded through the macros; panel gauges go through `set_gauge`.
    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
