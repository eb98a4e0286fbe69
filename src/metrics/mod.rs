//! Metrics module
//!
//! Process-wide Prometheus metrics for block writes, commits and uploads.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // Block metrics
    pub static ref BLOCKS_TOTAL: CounterVec = register_counter_vec!(
        "blockblob_blocks_total",
        "Total number of block writes",
        &["status"]
    ).unwrap();

    pub static ref BLOCK_BYTES_TOTAL: Counter = register_counter!(
        "blockblob_block_bytes_total",
        "Total bytes written as blocks"
    ).unwrap();

    // Commit metrics
    pub static ref COMMITS_TOTAL: CounterVec = register_counter_vec!(
        "blockblob_commits_total",
        "Total number of block list commits",
        &["status"]
    ).unwrap();

    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "blockblob_uploads_total",
        "Total number of uploads by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "blockblob_upload_bytes_total",
        "Total bytes of committed uploads"
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "blockblob_upload_duration_seconds",
        "Upload duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Transport metrics
    pub static ref RETRIES_TOTAL: CounterVec = register_counter_vec!(
        "blockblob_request_retries_total",
        "Retried requests",
        &["operation"]
    ).unwrap();
}

/// Record a written block
pub fn record_block_success(bytes: u64) {
    BLOCKS_TOTAL.with_label_values(&["success"]).inc();
    BLOCK_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a block that terminally failed
pub fn record_block_failure() {
    BLOCKS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record a block list commit
pub fn record_commit(success: bool) {
    let status = if success { "success" } else { "failure" };
    COMMITS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a committed upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record an aborted upload, labelled by error kind
pub fn record_upload_failure(kind: &str) {
    UPLOADS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record upload duration
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

/// Record a transport retry
pub fn record_retry(operation: &str) {
    RETRIES_TOTAL.with_label_values(&[operation]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
