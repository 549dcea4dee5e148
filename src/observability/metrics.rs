use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, MetricFamily, MetricType};
use prometheus::{HistogramOpts, HistogramVec, Registry, TextEncoder};
use std::collections::HashMap;

const REQUEST_LABELS: &[&str] = &["service", "method", "route", "status"];

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUESTS_TOTAL_HELP: &str = "Total number of HTTP requests";

/// One completed request, as seen by the instrumentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub service: String,
    pub method: String,
    pub route: String,
    pub status: u16,
    pub duration_ms: f64,
}

/// Process-local request metrics.
///
/// Owns its own `prometheus::Registry` instead of the global default one,
/// so every test (and every embedding application) gets an isolated set of
/// series. Counters and histograms are append-only.
///
/// The latency histogram is the only thing written per request;
/// `http_requests_total` is read off each histogram child's sample count at
/// collection time, so the counter and `_count` always agree in a snapshot.
pub struct MetricsRegistry {
    registry: Registry,
    request_duration_ms: HistogramVec,
}

impl MetricsRegistry {
    /// Create a registry with the given latency bucket bounds (milliseconds)
    pub fn new(latency_buckets_ms: Vec<f64>) -> Result<Self, prometheus::Error> {
        // prometheus only validates buckets when the first child series is created
        if latency_buckets_ms.is_empty() {
            return Err(prometheus::Error::Msg(
                "at least one latency bucket is required".to_string(),
            ));
        }
        if latency_buckets_ms.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(prometheus::Error::Msg(format!(
                "latency buckets must be strictly increasing: {:?}",
                latency_buckets_ms
            )));
        }

        let request_duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_ms",
                "HTTP request latency in milliseconds",
            )
            .buckets(latency_buckets_ms),
            REQUEST_LABELS,
        )?;

        let registry = Registry::new();
        registry.register(Box::new(RequestCollector::new(request_duration_ms.clone())?))?;

        Ok(Self {
            registry,
            request_duration_ms,
        })
    }

    /// Record one completed request. Never fails; label errors are logged and dropped.
    ///
    /// A single histogram observation, so a concurrent snapshot sees either
    /// the whole sample or none of it.
    pub fn record_request(&self, sample: &MetricSample) {
        let status = sample.status.to_string();
        let labels = [
            sample.service.as_str(),
            sample.method.as_str(),
            sample.route.as_str(),
            status.as_str(),
        ];

        match self.request_duration_ms.get_metric_with_label_values(&labels) {
            Ok(histogram) => histogram.observe(sample.duration_ms.max(0.0)),
            Err(e) => {
                tracing::warn!(error = %e, route = %sample.route, "Dropping request sample");
            }
        }
    }

    /// Render all series in the Prometheus text exposition format
    pub fn snapshot(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }

    /// Content type of [`snapshot`](Self::snapshot) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Current `http_requests_total` value for a key, mainly for tests and diagnostics
    pub fn request_count(&self, service: &str, method: &str, route: &str, status: u16) -> u64 {
        self.latency_count(service, method, route, status)
    }

    /// Number of latency observations for a key
    pub fn latency_count(&self, service: &str, method: &str, route: &str, status: u16) -> u64 {
        let status = status.to_string();
        self.request_duration_ms
            .get_metric_with_label_values(&[service, method, route, &status])
            .map(|histogram| histogram.get_sample_count())
            .unwrap_or(0)
    }
}

/// Exposes the latency histogram plus a request counter derived from it
struct RequestCollector {
    durations: HistogramVec,
    requests_total: Desc,
}

impl RequestCollector {
    fn new(durations: HistogramVec) -> Result<Self, prometheus::Error> {
        let requests_total = Desc::new(
            REQUESTS_TOTAL.to_string(),
            REQUESTS_TOTAL_HELP.to_string(),
            REQUEST_LABELS.iter().map(|label| label.to_string()).collect(),
            HashMap::new(),
        )?;

        Ok(Self {
            durations,
            requests_total,
        })
    }
}

impl Collector for RequestCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.durations.desc();
        descs.push(&self.requests_total);
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let histograms = self.durations.collect();

        let mut totals = MetricFamily::default();
        totals.set_name(REQUESTS_TOTAL.to_string());
        totals.set_help(REQUESTS_TOTAL_HELP.to_string());
        totals.set_field_type(MetricType::COUNTER);

        for family in &histograms {
            for metric in family.get_metric() {
                let mut counter = proto::Counter::default();
                counter.set_value(metric.get_histogram().get_sample_count() as f64);

                let mut series = proto::Metric::default();
                series.set_label(metric.get_label().to_vec().into());
                series.set_counter(counter);
                totals.mut_metric().push(series);
            }
        }

        let mut families = histograms;
        families.push(totals);
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(vec![5.0, 50.0, 500.0]).unwrap()
    }

    fn sample(route: &str, status: u16, duration_ms: f64) -> MetricSample {
        MetricSample {
            service: "web".to_string(),
            method: "GET".to_string(),
            route: route.to_string(),
            status,
            duration_ms,
        }
    }

    #[test]
    fn test_repeated_samples_accumulate() {
        let metrics = registry();
        for _ in 0..7 {
            metrics.record_request(&sample("/users/:id", 200, 12.0));
        }

        assert_eq!(metrics.request_count("web", "GET", "/users/:id", 200), 7);
        assert_eq!(metrics.latency_count("web", "GET", "/users/:id", 200), 7);
    }

    #[test]
    fn test_status_splits_series() {
        let metrics = registry();
        metrics.record_request(&sample("/threads", 200, 3.0));
        metrics.record_request(&sample("/threads", 500, 3.0));

        assert_eq!(metrics.request_count("web", "GET", "/threads", 200), 1);
        assert_eq!(metrics.request_count("web", "GET", "/threads", 500), 1);
    }

    #[test]
    fn test_snapshot_exposition() {
        let metrics = registry();
        metrics.record_request(&sample("/threads", 200, 20.0));

        let text = metrics.snapshot().unwrap();
        assert!(text.contains(
            r#"http_requests_total{method="GET",route="/threads",service="web",status="200"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_ms_bucket{method="GET",route="/threads",service="web",status="200",le="5"} 0"#
        ));
        assert!(text.contains(
            r#"http_request_duration_ms_bucket{method="GET",route="/threads",service="web",status="200",le="50"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_ms_bucket{method="GET",route="/threads",service="web",status="200",le="+Inf"} 1"#
        ));
        assert!(text.contains(
            r#"http_request_duration_ms_count{method="GET",route="/threads",service="web",status="200"} 1"#
        ));
    }

    #[test]
    fn test_empty_buckets_rejected() {
        assert!(MetricsRegistry::new(Vec::new()).is_err());
    }

    #[test]
    fn test_unsorted_buckets_rejected() {
        assert!(MetricsRegistry::new(vec![50.0, 5.0]).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording_is_not_lost() {
        let metrics = Arc::new(registry());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    metrics.record_request(&sample("/feed", 200, 1.0));
                    let _ = metrics.snapshot();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(metrics.request_count("web", "GET", "/feed", 200), 2000);
        assert_eq!(metrics.latency_count("web", "GET", "/feed", 200), 2000);
    }

    fn series_value(text: &str, prefix: &str) -> Option<u64> {
        text.lines()
            .find(|line| line.starts_with(prefix))
            .and_then(|line| line.rsplit(' ').next())
            .map(|value| value.parse::<f64>().unwrap() as u64)
    }

    #[test]
    fn test_snapshot_never_shows_partial_sample() {
        let metrics = registry();
        let writing = AtomicBool::new(true);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..20_000 {
                    metrics.record_request(&sample("/feed", 200, 1.0));
                }
                writing.store(false, Ordering::SeqCst);
            });

            let mut snapshots = 0;
            while writing.load(Ordering::SeqCst) || snapshots == 0 {
                let text = metrics.snapshot().unwrap();
                let total = series_value(
                    &text,
                    r#"http_requests_total{method="GET",route="/feed",service="web",status="200"}"#,
                );
                let count = series_value(
                    &text,
                    r#"http_request_duration_ms_count{method="GET",route="/feed",service="web",status="200"}"#,
                );
                assert_eq!(total, count, "torn snapshot:\n{text}");
                snapshots += 1;
            }
        });

        let text = metrics.snapshot().unwrap();
        assert!(text.contains(
            r#"http_requests_total{method="GET",route="/feed",service="web",status="200"} 20000"#
        ));
        assert!(text.contains("# TYPE http_requests_total counter"));
    }
}
