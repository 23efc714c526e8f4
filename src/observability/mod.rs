//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! Segue exposes the following metrics:
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `segue_segments_configured` | Counter | Segment boundaries processed |
//! | `segue_output_bytes` | Counter | PCM bytes taken by consumers |
//! | `segue_frames_delivered` | Counter | Frames accepted downstream |
//! | `segue_frame_rejections` | Counter | Rejected delivery attempts |
//! | `segue_input_buffers_available` | Gauge | Free input buffers |
//!
//! ## Tracing
//!
//! Segue emits spans around segment input output pulls and around every
//! connector task.
//!
//! ## Example
//!
//! ```rust,ignore
//! use segue::observability::init_metrics;
//!
//! // Call once at startup, then install any metrics exporter
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    ConnectorMetrics, init_metrics, record_input_buffers_available, record_output_bytes,
    record_segment_configured,
};
pub use tracing_support::{
    span_connector, span_segment_input, trace_error, trace_frame_rejected, trace_segment_change,
};
