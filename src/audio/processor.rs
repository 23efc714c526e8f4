//! The audio stage contract.

use super::PcmCursor;
use crate::error::Result;
use crate::format::AudioFormat;

/// One stateful step of an audio processing chain.
///
/// A stage is configured with an input format, reports the output format it
/// will produce, and then converts PCM data pushed through
/// [`queue_input`](Self::queue_input). Output is collected with
/// [`take_output`](Self::take_output).
///
/// The lifecycle is:
///
/// ```text
/// configure ──> flush ──> queue_input* ──> queue_end_of_stream ──> is_ended
///     ^                                                              │
///     └──────────────────────────── reset ───────────────────────────┘
/// ```
pub trait AudioProcessor: Send {
    /// Stage name used in logs.
    fn name(&self) -> &str;

    /// Configure the stage for `input`, returning the output format.
    ///
    /// Inactive stages return `input` unchanged. Formats the stage cannot
    /// handle yield [`Error::UnhandledAudioFormat`](crate::Error::UnhandledAudioFormat).
    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat>;

    /// Whether the stage changes audio under its current configuration.
    fn is_active(&self) -> bool;

    /// Push input, returning how many bytes were consumed.
    fn queue_input(&mut self, input: &[u8]) -> usize;

    /// Signal that no more input will follow until the next flush.
    fn queue_end_of_stream(&mut self);

    /// Take all output produced so far. Empty if there is none.
    fn take_output(&mut self) -> PcmCursor;

    /// True once end-of-stream was queued and all output has been taken.
    fn is_ended(&self) -> bool;

    /// Drop buffered data, ready for a new stream in the same configuration.
    fn flush(&mut self);

    /// Return to the unconfigured state.
    fn reset(&mut self);
}

/// Buffering shared by the built-in stages.
///
/// Holds produced output until taken, any trailing partial frame awaiting
/// its remaining bytes, and the end-of-stream flag.
#[derive(Debug, Default)]
pub struct StageBuffers {
    output: PcmCursor,
    partial: Vec<u8>,
    input_ended: bool,
}

impl StageBuffers {
    /// Combine carried bytes with `input` and split off whole frames.
    ///
    /// Bytes of an incomplete trailing frame are kept for the next call.
    pub fn whole_frames(&mut self, input: &[u8], frame_size: usize) -> Vec<u8> {
        let mut data = std::mem::take(&mut self.partial);
        data.extend_from_slice(input);
        let whole = data.len() / frame_size * frame_size;
        self.partial = data.split_off(whole);
        data
    }

    /// Storage that new output is appended to.
    pub fn output_mut(&mut self) -> &mut Vec<u8> {
        self.output.data_mut()
    }

    /// Take everything produced so far.
    pub fn take_output(&mut self) -> PcmCursor {
        std::mem::take(&mut self.output)
    }

    /// Mark input ended. Returns false if it already was.
    pub fn queue_end_of_stream(&mut self) -> bool {
        if self.input_ended {
            return false;
        }
        if !self.partial.is_empty() {
            tracing::trace!(
                "dropping {} bytes of incomplete frame at end of stream",
                self.partial.len()
            );
            self.partial.clear();
        }
        self.input_ended = true;
        true
    }

    /// Returns true once input ended and all output has been taken.
    pub fn is_ended(&self) -> bool {
        self.input_ended && !self.output.has_remaining()
    }

    /// Returns true if end-of-stream was queued.
    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    /// Drop all buffered data and clear the end-of-stream flag.
    pub fn flush(&mut self) {
        self.output = PcmCursor::default();
        self.partial.clear();
        self.input_ended = false;
    }
}
