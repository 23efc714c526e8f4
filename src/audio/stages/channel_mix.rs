//! Channel count conversion stage.

use crate::audio::{AudioProcessor, PcmCursor, StageBuffers};
use crate::converters::{ChannelMixingMatrix, decode_samples, encode_samples};
use crate::error::{Error, Result};
use crate::format::AudioFormat;
use std::collections::HashMap;

/// Remixes channels with a matrix chosen by input channel count.
///
/// Active iff the chosen matrix is not an identity.
#[derive(Debug, Default)]
pub struct ChannelMixingStage {
    matrices: HashMap<u32, ChannelMixingMatrix>,
    format: Option<AudioFormat>,
    active: Option<ChannelMixingMatrix>,
    buffers: StageBuffers,
}

impl ChannelMixingStage {
    /// Create a stage with no matrices registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `matrix` for its input channel count.
    pub fn with_matrix(mut self, matrix: ChannelMixingMatrix) -> Self {
        self.put_channel_mixing_matrix(matrix);
        self
    }

    /// Register `matrix` for its input channel count, replacing any previous one.
    pub fn put_channel_mixing_matrix(&mut self, matrix: ChannelMixingMatrix) {
        self.matrices.insert(matrix.input_channels(), matrix);
    }
}

impl AudioProcessor for ChannelMixingStage {
    fn name(&self) -> &str {
        "channel-mix"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        let Some(matrix) = self.matrices.get(&input.channel_count) else {
            return Err(Error::unhandled_format(
                input,
                format!("no channel mixing matrix for {} channels", input.channel_count),
            ));
        };

        self.format = Some(input);
        let output = AudioFormat {
            channel_count: matrix.output_channels(),
            ..input
        };
        self.active = (!matrix.is_identity()).then(|| matrix.clone());
        Ok(output)
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }

    fn queue_input(&mut self, input: &[u8]) -> usize {
        let (Some(format), Some(matrix)) = (self.format, self.active.as_ref()) else {
            return 0;
        };
        if self.buffers.input_ended() {
            return 0;
        }

        let frames = self.buffers.whole_frames(input, format.bytes_per_frame());
        let mixed = matrix.mix(&decode_samples(format.encoding, &frames));
        encode_samples(format.encoding, &mixed, self.buffers.output_mut());
        input.len()
    }

    fn queue_end_of_stream(&mut self) {
        self.buffers.queue_end_of_stream();
    }

    fn take_output(&mut self) -> PcmCursor {
        self.buffers.take_output()
    }

    fn is_ended(&self) -> bool {
        self.buffers.is_ended()
    }

    fn flush(&mut self) {
        self.buffers.flush();
    }

    fn reset(&mut self) {
        self.buffers.flush();
        self.format = None;
        self.active = None;
    }
}
