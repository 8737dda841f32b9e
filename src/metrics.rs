/// Prometheus metrics for the resolver
///
/// - HTTP request counts and latencies, labelled by route template
/// - Record writes per entity and operation
/// - Redirection failures by reason
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Total HTTP requests by method, route and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "keyresolver_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("http request counter registers once");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "keyresolver_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("http duration histogram registers once");

    /// Successful record writes by entity and operation
    pub static ref RECORD_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "keyresolver_record_writes_total",
        "Successful record writes",
        &["entity", "operation"]
    )
    .expect("record write counter registers once");

    /// Redirection walks that failed, by reason
    pub static ref REDIRECT_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "keyresolver_redirect_failures_total",
        "Redirection chains rejected as cyclic or too deep",
        &["reason"]
    )
    .expect("redirect failure counter registers once");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a successful create/update/delete
pub fn record_write(entity: &str, operation: &str) {
    RECORD_WRITES_TOTAL.with_label_values(&[entity, operation]).inc();
}

/// Record a rejected redirection walk
pub fn record_redirect_failure(reason: &str) {
    REDIRECT_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

/// Middleware timing every request. Labels use the route template so hashes
/// in paths do not explode label cardinality.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/address/:hash", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("keyresolver_http_requests_total"));
        assert!(metrics.contains("keyresolver_http_request_duration_seconds"));
    }

    #[test]
    fn test_record_write() {
        record_write("address", "create");
        let metrics = render_metrics();
        assert!(metrics.contains("keyresolver_record_writes_total"));
        assert!(metrics.contains("operation=\"create\""));
    }

    #[test]
    fn test_record_redirect_failure() {
        record_redirect_failure("cyclic");
        let metrics = render_metrics();
        assert!(metrics.contains("keyresolver_redirect_failures_total"));
        assert!(metrics.contains("reason=\"cyclic\""));
    }
}
