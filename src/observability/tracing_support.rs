//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Create a span covering work done by a segment input.
///
/// # Example
///
/// ```rust,ignore
/// use segue::observability::span_segment_input;
///
/// let span = span_segment_input("audio");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_segment_input(name: &str) -> Span {
    span!(Level::DEBUG, "segment_input", name = %name)
}

/// Create a span covering tasks run for a stage connector.
#[inline]
pub fn span_connector(name: &str) -> Span {
    span!(Level::DEBUG, "connector", name = %name)
}

/// Log a segment boundary taking effect.
#[inline]
pub fn trace_segment_change(input: &str, format: &dyn std::fmt::Display, silence: bool, last: bool) {
    tracing::info!(
        input = %input,
        format = %format,
        silence = silence,
        last = last,
        "segment configured"
    );
}

/// Log a frame rejected by the downstream stage.
#[inline]
pub fn trace_frame_rejected(connector: &str, presentation_time_us: i64) {
    tracing::trace!(
        connector = %connector,
        presentation_time_us = presentation_time_us,
        "frame rejected, retry scheduled"
    );
}

/// Log an error.
#[inline]
pub fn trace_error(context: &str, error: &dyn std::error::Error) {
    tracing::error!(
        context = %context,
        error = %error,
        "task failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        let _span = span_segment_input("audio");
        let _span = span_connector("a->b");
    }

    #[test]
    fn test_trace_functions() {
        // No subscriber installed, must not panic
        trace_segment_change("audio", &"44100Hz/2ch/S16Le", true, false);
        trace_frame_rejected("a->b", 100);
        trace_error("a->b", &crate::Error::Stage("gl".into()));
    }
}
