//! # Collector
//!
//! [metrics] recorder that snapshots live counters, gauges and histograms into a [Batch]

use super::batch::Batch;
use super::error::BoxError;
use super::measurement::Measurement;
use super::poster::{PostReport, Poster};
use bytes::Bytes;
use http::{Request, Response};
use metrics::SharedString;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Configuration via Builder
pub struct Config {
    pub prefix: Option<SharedString>,
    pub timestamp: Option<u64>,
}

/// Running summary of histogram samples since the last snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Summary {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    sum_squares: f64,
}

impl Summary {
    fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
    }
}

fn push_sanitized(name: &mut String, part: &str) {
    name.extend(part.chars().map(|c| match c {
        'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | ':' | '_' | '-' => c,
        _ => '_',
    }));
}

/// Histogram Handler summarizing into a mutex guarded [Summary]
#[derive(Default)]
struct HistogramHandle {
    summary: Mutex<Summary>,
}

impl HistogramHandle {
    fn take(&self) -> Summary {
        std::mem::take(&mut *self.summary.lock().unwrap())
    }
}

impl metrics::HistogramFn for HistogramHandle {
    fn record(&self, value: f64) {
        match self.summary.lock() {
            Ok(mut summary) => summary.record(value),
            Err(_) => error!("Failed to record histogram value, summary lock poisoned"),
        }
    }
}

// Metric information stored in an index
enum MetricInfo {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicU64>),
    Histogram(Arc<HistogramHandle>),
}

impl MetricInfo {
    fn kind(&self) -> &'static str {
        match self {
            MetricInfo::Counter(_) => "counter",
            MetricInfo::Gauge(_) => "gauge",
            MetricInfo::Histogram(_) => "histogram",
        }
    }
}

/// Collector for the [metrics] crate, reported through a [Poster]
///
/// Use [Builder](super::Builder) to construct
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use http::{Request, Response};
///
/// let (collector, _poster) = metrics_librato::Builder::new()
///     .endpoint("http://localhost:8080/v1/metrics")
///     .with_prefix("app")
///     .build_with_collector(tower::service_fn(|_: Request<Bytes>| async {
///         Ok::<_, std::convert::Infallible>(Response::new(Bytes::new()))
///     }))
///     .unwrap();
///
/// metrics::with_local_recorder(&collector, || {
///     metrics::counter!("requests", "method" => "get").increment(1);
/// });
///
/// let batch = collector.snapshot();
/// assert_eq!(batch.measurements()[0].name(), "app.requests.method:get");
/// ```
pub struct Collector {
    /// Rendered metric name to its live value
    state: Mutex<BTreeMap<String, MetricInfo>>,
    pub config: Config,
}

impl Collector {
    pub fn new(config: Config) -> Self {
        Self {
            state: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    /// Compute the measure time unless it was set via [Builder::with_timestamp](super::Builder::with_timestamp)
    fn timestamp(&self) -> u64 {
        match self.config.timestamp {
            Some(t) => t,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        }
    }

    /// Render prefix, name and labels (sorted by key) into a single metric name
    ///
    /// Characters outside `[A-Za-z0-9.:_-]` are replaced with `_`
    fn metric_name(&self, key: &metrics::Key) -> Option<String> {
        if key.name().trim().is_empty() {
            return None;
        }

        let mut labels: Vec<&metrics::Label> = key.labels().collect();
        labels.sort_by(|a, b| a.key().cmp(b.key()));

        let mut name = String::new();
        if let Some(prefix) = &self.config.prefix {
            push_sanitized(&mut name, prefix);
            name.push('.');
        }
        push_sanitized(&mut name, key.name());
        for label in labels {
            name.push('.');
            push_sanitized(&mut name, label.key());
            name.push(':');
            push_sanitized(&mut name, label.value());
        }
        Some(name)
    }

    /// Copy current values into a new [Batch]
    ///
    /// Counters report their running total, gauges their last value and histograms a
    /// summary of the samples recorded since the previous snapshot. Histograms without
    /// new samples are omitted.
    pub fn snapshot(&self) -> Batch {
        let state = self.state.lock().unwrap();
        let mut batch = Batch::with_capacity(state.len());

        for (name, info) in state.iter() {
            let measurement = match info {
                MetricInfo::Counter(value) => Measurement::counter(name.as_str(), value.load(Ordering::Relaxed)),
                MetricInfo::Gauge(value) => {
                    Measurement::gauge(name.as_str(), f64::from_bits(value.load(Ordering::Relaxed)))
                }
                MetricInfo::Histogram(histogram) => {
                    let summary = histogram.take();
                    if summary.count == 0 {
                        continue;
                    }
                    Measurement::aggregated(
                        name.as_str(),
                        summary.count,
                        summary.sum,
                        summary.min,
                        summary.max,
                        Some(summary.sum_squares),
                    )
                }
            };

            match measurement {
                Ok(measurement) => {
                    batch.add(measurement);
                }
                Err(e) => error!("Unable to report {name}: {e}"),
            }
        }

        batch
    }

    /// Snapshot and post in one delivery cycle
    pub async fn post<S>(&self, poster: &mut Poster<S>, source: &str) -> PostReport
    where
        S: tower::Service<Request<Bytes>, Response = Response<Bytes>>,
        S::Error: Into<BoxError>,
    {
        poster.post(self.snapshot(), source, self.timestamp()).await
    }

    fn register<T>(
        &self,
        key: &metrics::Key,
        kind: &'static str,
        create: impl FnOnce() -> MetricInfo,
        handle: impl FnOnce(&MetricInfo) -> Option<T>,
    ) -> Option<T> {
        let Some(name) = self.metric_name(key) else {
            error!("Unable to register {kind} {key} with an empty name");
            return None;
        };

        let mut state = self.state.lock().unwrap();
        let info = state.entry(name).or_insert_with(create);
        let handle = handle(&*info);
        if handle.is_none() {
            error!("Unable to register {kind} {key} as it was already registered as a {}", info.kind());
        }
        handle
    }
}

impl metrics::Recorder for Collector {
    fn describe_counter(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &metrics::Key, _metadata: &metrics::Metadata<'_>) -> metrics::Counter {
        self.register(
            key,
            "counter",
            || MetricInfo::Counter(Arc::new(AtomicU64::new(0))),
            |info| match info {
                MetricInfo::Counter(value) => Some(metrics::Counter::from_arc(value.clone())),
                _ => None,
            },
        )
        .unwrap_or_else(metrics::Counter::noop)
    }

    fn register_gauge(&self, key: &metrics::Key, _metadata: &metrics::Metadata<'_>) -> metrics::Gauge {
        self.register(
            key,
            "gauge",
            || MetricInfo::Gauge(Arc::new(AtomicU64::new(0))),
            |info| match info {
                MetricInfo::Gauge(value) => Some(metrics::Gauge::from_arc(value.clone())),
                _ => None,
            },
        )
        .unwrap_or_else(metrics::Gauge::noop)
    }

    fn register_histogram(&self, key: &metrics::Key, _metadata: &metrics::Metadata<'_>) -> metrics::Histogram {
        self.register(
            key,
            "histogram",
            || MetricInfo::Histogram(Arc::default()),
            |info| match info {
                MetricInfo::Histogram(histogram) => Some(metrics::Histogram::from_arc(histogram.clone())),
                _ => None,
            },
        )
        .unwrap_or_else(metrics::Histogram::noop)
    }
}

/// Global recorder handle installed by [Builder::init](super::Builder::init)
pub struct Recorder {
    collector: Arc<Collector>,
}

impl From<Arc<Collector>> for Recorder {
    fn from(collector: Arc<Collector>) -> Self {
        Self { collector }
    }
}

impl metrics::Recorder for Recorder {
    fn describe_counter(&self, key: metrics::KeyName, unit: Option<metrics::Unit>, description: SharedString) {
        metrics::Recorder::describe_counter(&*self.collector, key, unit, description)
    }

    fn describe_gauge(&self, key: metrics::KeyName, unit: Option<metrics::Unit>, description: SharedString) {
        metrics::Recorder::describe_gauge(&*self.collector, key, unit, description)
    }

    fn describe_histogram(&self, key: metrics::KeyName, unit: Option<metrics::Unit>, description: SharedString) {
        metrics::Recorder::describe_histogram(&*self.collector, key, unit, description)
    }

    fn register_counter(&self, key: &metrics::Key, metadata: &metrics::Metadata<'_>) -> metrics::Counter {
        metrics::Recorder::register_counter(&*self.collector, key, metadata)
    }

    fn register_gauge(&self, key: &metrics::Key, metadata: &metrics::Metadata<'_>) -> metrics::Gauge {
        metrics::Recorder::register_gauge(&*self.collector, key, metadata)
    }

    fn register_histogram(&self, key: &metrics::Key, metadata: &metrics::Metadata<'_>) -> metrics::Histogram {
        metrics::Recorder::register_histogram(&*self.collector, key, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Kind;
    use serde_json::{json, Value};

    fn collector(prefix: Option<&'static str>) -> Collector {
        Collector::new(Config {
            prefix: prefix.map(SharedString::from),
            timestamp: Some(1000),
        })
    }

    fn fields(batch: &Batch) -> Vec<(String, Kind, Value)> {
        batch
            .measurements()
            .iter()
            .map(|m| (m.name().to_owned(), m.kind(), Value::Object(m.fields())))
            .collect()
    }

    #[test]
    fn snapshot() {
        let collector = collector(None);

        metrics::with_local_recorder(&collector, || {
            metrics::counter!("requests", "method" => "get", "api" => "users").increment(2);
            metrics::counter!("requests", "api" => "users", "method" => "get").increment(1);
            metrics::gauge!("load").set(0.5);
            metrics::histogram!("latency").record(1.0);
            metrics::histogram!("latency").record(3.0);
            metrics::histogram!("latency").record(2.0);
        });

        assert_eq!(
            fields(&collector.snapshot()),
            vec![
                (
                    "latency".to_owned(),
                    Kind::Gauge,
                    json!({"count": 3, "sum": 6.0, "min": 1.0, "max": 3.0, "sum_squares": 14.0})
                ),
                ("load".to_owned(), Kind::Gauge, json!({"value": 0.5})),
                ("requests.api:users.method:get".to_owned(), Kind::Counter, json!({"value": 3})),
            ]
        );

        // Counters keep their running total, histograms only report new samples
        metrics::with_local_recorder(&collector, || {
            metrics::counter!("requests", "method" => "get", "api" => "users").increment(1);
        });
        assert_eq!(
            fields(&collector.snapshot()),
            vec![
                ("load".to_owned(), Kind::Gauge, json!({"value": 0.5})),
                ("requests.api:users.method:get".to_owned(), Kind::Counter, json!({"value": 4})),
            ]
        );
    }

    #[test]
    fn prefix() {
        let collector = collector(Some("app"));
        metrics::with_local_recorder(&collector, || metrics::gauge!("load").set(1.0));
        assert_eq!(collector.snapshot().measurements()[0].name(), "app.load");
    }

    #[test]
    fn conflicting_kinds_are_ignored() {
        let collector = collector(None);
        metrics::with_local_recorder(&collector, || {
            metrics::counter!("thing").increment(1);
            metrics::gauge!("thing").set(7.0);
            metrics::histogram!("thing").record(7.0);
        });

        assert_eq!(
            fields(&collector.snapshot()),
            vec![("thing".to_owned(), Kind::Counter, json!({"value": 1}))]
        );
    }

    #[test]
    fn names_are_sanitized() {
        let collector = collector(Some("my app"));
        metrics::with_local_recorder(&collector, || {
            metrics::counter!("hits/sec", "path" => "/v1/users list", "zone id" => "eu-west-1").increment(1)
        });
        assert_eq!(
            collector.snapshot().measurements()[0].name(),
            "my_app.hits_sec.path:_v1_users_list.zone_id:eu-west-1"
        );
    }

    #[test]
    fn non_finite_gauges_are_dropped() {
        let collector = collector(None);
        metrics::with_local_recorder(&collector, || {
            metrics::gauge!("broken").set(f64::NAN);
            metrics::gauge!("overflow").set(f64::INFINITY);
            metrics::histogram!("spike").record(f64::NEG_INFINITY);
            metrics::gauge!("load").set(0.5);
        });

        assert_eq!(
            fields(&collector.snapshot()),
            vec![("load".to_owned(), Kind::Gauge, json!({"value": 0.5}))]
        );
    }

    #[test]
    fn empty_names_are_ignored() {
        let collector = collector(None);
        metrics::with_local_recorder(&collector, || metrics::counter!("").increment(1));
        assert!(collector.snapshot().is_empty());
    }

    #[test]
    fn summary() {
        let mut summary = Summary::default();
        summary.record(-2.0);
        summary.record(4.0);
        assert_eq!(
            summary,
            Summary {
                count: 2,
                sum: 2.0,
                min: -2.0,
                max: 4.0,
                sum_squares: 20.0,
            }
        );
    }
}
