use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// Descriptors provide human-readable descriptions for Prometheus.
pub fn describe_all_metrics() {
    // -- Upload metrics --
    describe_counter!(
        "tubely_uploads_total",
        "Upload requests by kind and outcome"
    );
    describe_histogram!("tubely_upload_duration_seconds", "End-to-end upload latency");
    describe_histogram!("tubely_upload_size_bytes", "Spooled upload size");
    describe_counter!(
        "tubely_upload_orientation_total",
        "Published videos by orientation"
    );

    // -- Media tool metrics --
    describe_histogram!(
        "tubely_media_tool_duration_seconds",
        "ffprobe / ffmpeg wall-clock time"
    );
    describe_counter!(
        "tubely_media_tool_errors_total",
        "Media tool failures by tool and kind"
    );

    // -- Storage metrics --
    describe_histogram!("tubely_storage_put_duration_seconds", "Object PUT latency");
    describe_counter!("tubely_storage_put_bytes_total", "Total bytes written");
    describe_counter!("tubely_storage_errors_total", "Storage operation errors");
    describe_counter!(
        "tubely_signed_urls_issued_total",
        "Signed retrieval URLs issued"
    );
    describe_counter!(
        "tubely_signed_url_errors_total",
        "Signed URL issuance failures"
    );
    describe_counter!(
        "tubely_asset_requests_total",
        "Object delivery requests by status"
    );

    // -- System metrics --
    describe_gauge!("tubely_uptime_seconds", "Process uptime");
    describe_counter!(
        "tubely_panic_total",
        "Total panics caught (should always be 0)"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- Uploads --

pub fn inc_upload(kind: &str, outcome: &str) {
    counter!("tubely_uploads_total", "kind" => kind.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_upload_duration(kind: &str, seconds: f64) {
    histogram!("tubely_upload_duration_seconds", "kind" => kind.to_string()).record(seconds);
}

pub fn record_upload_size(kind: &str, bytes: u64) {
    histogram!("tubely_upload_size_bytes", "kind" => kind.to_string()).record(bytes as f64);
}

pub fn inc_orientation(orientation: &str) {
    counter!("tubely_upload_orientation_total", "orientation" => orientation.to_string())
        .increment(1);
}

// -- Media tools --

pub fn record_tool_duration(tool: &str, seconds: f64) {
    histogram!("tubely_media_tool_duration_seconds", "tool" => tool.to_string()).record(seconds);
}

pub fn inc_tool_error(tool: &str, error_type: &str) {
    counter!("tubely_media_tool_errors_total", "tool" => tool.to_string(), "error_type" => error_type.to_string()).increment(1);
}

// -- Storage --

pub fn record_storage_put_duration(backend: &str, seconds: f64) {
    histogram!("tubely_storage_put_duration_seconds", "backend" => backend.to_string())
        .record(seconds);
}

pub fn add_storage_put_bytes(backend: &str, bytes: u64) {
    counter!("tubely_storage_put_bytes_total", "backend" => backend.to_string()).increment(bytes);
}

pub fn inc_storage_error(operation: &str, error_type: &str) {
    counter!("tubely_storage_errors_total", "operation" => operation.to_string(), "error_type" => error_type.to_string()).increment(1);
}

pub fn inc_signed_url_issued(backend: &str) {
    counter!("tubely_signed_urls_issued_total", "backend" => backend.to_string()).increment(1);
}

pub fn inc_signed_url_error(error_type: &str) {
    counter!("tubely_signed_url_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

pub fn inc_asset_request(status: &str) {
    counter!("tubely_asset_requests_total", "status" => status.to_string()).increment(1);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("tubely_uptime_seconds").set(seconds);
}

pub fn inc_panic_total() {
    counter!("tubely_panic_total").increment(1);
}

/// Collapse an HTTP status code into a `2xx`/`4xx`/`5xx` label.
pub fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Update the uptime gauge every second until cancelled.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the global Prometheus recorder.
///
/// Returns a handle that renders the Prometheus text exposition format.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// A handle backed by a recorder that is never installed globally.
///
/// Used where a `/metrics` handle is required but no process-wide recorder
/// should be registered, e.g. router tests.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
