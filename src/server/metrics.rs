use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all getstats metrics
const PREFIX: &str = "getstats";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Ingest Metrics
    pub static ref PAYLOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_payloads_total"), "Payloads processed by the writer"),
        &["status"]
    ).expect("Failed to create payloads_total metric");

    pub static ref PAYLOAD_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_payload_duration_seconds"),
            "Time the writer spent on a payload in seconds"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["status"]
    ).expect("Failed to create payload_duration_seconds metric");

    pub static ref ROWS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rows_total"), "Report rows by outcome"),
        &["status"]
    ).expect("Failed to create rows_total metric");

    pub static ref FIELDS_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_fields_dropped_total"), "Report fields without a usable column name"),
        &["reason"]
    ).expect("Failed to create fields_dropped_total metric");

    // Schema Metrics
    pub static ref COLUMNS_CREATED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_columns_created_total"),
        "Columns added to the stats table"
    ).expect("Failed to create columns_created_total metric");

    pub static ref SCHEMA_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_schema_errors_total"), "Failed column creations by step"),
        &["kind"]
    ).expect("Failed to create schema_errors_total metric");

    pub static ref KNOWN_COLUMNS: Gauge = Gauge::new(
        format!("{PREFIX}_known_columns"),
        "Columns currently on the stats table"
    ).expect("Failed to create known_columns metric");

    // Queue Metrics
    pub static ref QUEUE_REJECTIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_queue_rejections_total"),
        "Payloads refused because the ingest queue was full"
    ).expect("Failed to create queue_rejections_total metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(PAYLOADS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PAYLOAD_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ROWS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FIELDS_DROPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(COLUMNS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCHEMA_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(KNOWN_COLUMNS.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_REJECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a payload leaving the writer. `status` is one of `ok`, `partial`
/// or `decode_error`.
pub fn record_payload(status: &str, duration: Duration) {
    PAYLOADS_TOTAL.with_label_values(&[status]).inc();
    PAYLOAD_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

pub fn record_row(status: &str) {
    ROWS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_dropped_field(reason: &str) {
    FIELDS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_column_created() {
    COLUMNS_CREATED_TOTAL.inc();
}

pub fn record_schema_error(kind: &str) {
    SCHEMA_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_known_columns(count: usize) {
    KNOWN_COLUMNS.set(count as f64);
}

pub fn record_queue_rejection() {
    QUEUE_REJECTIONS_TOTAL.inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
