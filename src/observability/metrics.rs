//! Metrics collection using metrics-rs.

use metrics::{Counter, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const SEGMENTS_CONFIGURED: &str = "segue_segments_configured";
const OUTPUT_BYTES: &str = "segue_output_bytes";
const FRAMES_DELIVERED: &str = "segue_frames_delivered";
const FRAME_REJECTIONS: &str = "segue_frame_rejections";
const INPUT_BUFFERS_AVAILABLE: &str = "segue_input_buffers_available";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        SEGMENTS_CONFIGURED,
        Unit::Count,
        "Segment boundaries processed by segment inputs"
    );
    metrics::describe_counter!(
        OUTPUT_BYTES,
        Unit::Bytes,
        "PCM bytes consumed from segment inputs"
    );
    metrics::describe_counter!(
        FRAMES_DELIVERED,
        Unit::Count,
        "Frames accepted by downstream stages"
    );
    metrics::describe_counter!(
        FRAME_REJECTIONS,
        Unit::Count,
        "Frame deliveries rejected by downstream stages"
    );
    metrics::describe_gauge!(
        INPUT_BUFFERS_AVAILABLE,
        Unit::Count,
        "Input buffers available to the producer"
    );
}

/// Record a processed segment boundary.
#[inline]
pub fn record_segment_configured(input: &str) {
    counter!(SEGMENTS_CONFIGURED, "input" => input.to_string()).increment(1);
}

/// Record output bytes taken by the consumer.
#[inline]
pub fn record_output_bytes(input: &str, bytes: u64) {
    counter!(OUTPUT_BYTES, "input" => input.to_string()).increment(bytes);
}

/// Record the number of input buffers available to the producer.
#[inline]
pub fn record_input_buffers_available(input: &str, available: usize) {
    gauge!(INPUT_BUFFERS_AVAILABLE, "input" => input.to_string()).set(available as f64);
}

/// Metrics collector for one stage connector.
///
/// Handles are resolved once so the worker does not rebuild labels per frame.
#[derive(Clone)]
pub struct ConnectorMetrics {
    name: String,
    delivered: Counter,
    rejected: Counter,
}

impl ConnectorMetrics {
    /// Create a collector labelled with the connector name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delivered: counter!(FRAMES_DELIVERED, "connector" => name.to_string()),
            rejected: counter!(FRAME_REJECTIONS, "connector" => name.to_string()),
        }
    }

    /// Record a frame accepted downstream.
    #[inline]
    pub fn record_delivered(&self) {
        self.delivered.increment(1);
    }

    /// Record a rejected delivery attempt.
    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.increment(1);
    }

    /// Get the connector name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ConnectorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorMetrics")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
