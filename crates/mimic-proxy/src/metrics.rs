//! Prometheus metrics for mimic.
//!
//! Tracks how requests were resolved, watcher reloads and dropped live
//! traffic broadcasts.
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Requests by resolution kind
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_requests_total",
        "Total number of requests handled by the proxy listener",
        &["kind"]  // kind: proxy|mock|timeout|plugin
    )
    .unwrap();

    /// Handling time including mock delays and upstream I/O
    pub static ref REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mimic_request_duration_ms",
        "Histogram of request handling time in milliseconds",
        &["kind"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Rule files reloaded by the watcher
    pub static ref RULE_RELOADS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_rule_reloads_total",
        "Total number of watcher-triggered rule file reloads",
        &["result"]  // result: ok|error
    )
    .unwrap();

    /// Broadcasts dropped on a full subscriber buffer
    pub static ref TRAFFIC_DROPPED_TOTAL: Counter = register_counter!(
        "mimic_traffic_dropped_total",
        "Traffic entries not delivered because a subscriber buffer was full"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a resolved request
pub fn record_request(kind: &str, duration_ms: f64) {
    REQUESTS_TOTAL.with_label_values(&[kind]).inc();
    REQUEST_DURATION_MS
        .with_label_values(&[kind])
        .observe(duration_ms);
}

pub fn record_rule_reload(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    RULE_RELOADS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_traffic_dropped() {
    TRAFFIC_DROPPED_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request("mock", 12.0);
        record_rule_reload(true);
        record_rule_reload(false);
        record_traffic_dropped();

        let output = collect_metrics();
        assert!(output.contains("mimic_requests_total"));
        assert!(output.contains("mimic_request_duration_ms"));
        assert!(output.contains("mimic_rule_reloads_total"));
        assert!(output.contains("mimic_traffic_dropped_total"));
    }
}
