//! Metrics module
//!
//! Prometheus counters and histograms for uploads, parts and checkpoints,
//! registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_uploads_total",
        "Total number of file uploads",
        &["bucket", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "uploadr_upload_duration_seconds",
        "File upload duration in seconds",
        &["bucket"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 1800.0]
    ).unwrap();

    // Part metrics
    pub static ref PARTS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_parts_total",
        "Part uploads by outcome",
        &["status"]
    ).unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "uploadr_multipart_parts",
        "Number of parts per completed upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]
    ).unwrap();

    // Checkpoint metrics
    pub static ref CHECKPOINT_EVENTS: CounterVec = register_counter_vec!(
        "uploadr_checkpoint_events_total",
        "Checkpoints found at upload start",
        &["event"]  // "resumed", "discarded" or "corrupt"
    ).unwrap();
}

/// Record a completed upload
pub fn record_upload_success(bucket: &str, bytes: u64, parts_count: usize) {
    UPLOADS_TOTAL.with_label_values(&[bucket, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record a failed upload
pub fn record_upload_failure(bucket: &str) {
    UPLOADS_TOTAL.with_label_values(&[bucket, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(bucket: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[bucket])
        .observe(duration_secs);
}

/// Record a part upload outcome
pub fn record_part(success: bool) {
    let status = if success { "success" } else { "failure" };
    PARTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record what happened to a checkpoint found at upload start
pub fn record_checkpoint_event(event: &str) {
    CHECKPOINT_EVENTS.with_label_values(&[event]).inc();
}
