//! Sample rate conversion stage.

use crate::audio::{AudioProcessor, PcmCursor, StageBuffers};
use crate::converters::{AudioResample, decode_samples, encode_samples};
use crate::error::Result;
use crate::format::AudioFormat;

/// Converts the sample rate to a fixed target.
///
/// Inactive until a target rate is set that differs from the input rate.
#[derive(Debug, Default)]
pub struct ResampleStage {
    target_rate: Option<u32>,
    format: Option<AudioFormat>,
    resampler: Option<AudioResample>,
    buffers: StageBuffers,
}

impl ResampleStage {
    /// Create a stage without a target rate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target rate.
    pub fn with_output_sample_rate(mut self, sample_rate: u32) -> Self {
        self.target_rate = Some(sample_rate);
        self
    }

    /// Change the target rate. Takes effect on the next configuration.
    pub fn set_output_sample_rate(&mut self, sample_rate: u32) {
        self.target_rate = Some(sample_rate);
    }
}

impl AudioProcessor for ResampleStage {
    fn name(&self) -> &str {
        "resample"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        self.format = Some(input);
        self.resampler = None;

        let Some(target) = self.target_rate.filter(|&rate| rate != input.sample_rate) else {
            return Ok(input);
        };
        self.resampler = Some(AudioResample::new(
            input.sample_rate,
            target,
            input.channel_count,
        )?);
        Ok(AudioFormat {
            sample_rate: target,
            ..input
        })
    }

    fn is_active(&self) -> bool {
        self.resampler.is_some()
    }

    fn queue_input(&mut self, input: &[u8]) -> usize {
        let (Some(format), Some(resampler)) = (self.format, self.resampler.as_mut()) else {
            return 0;
        };
        if self.buffers.input_ended() {
            return 0;
        }

        let frames = self.buffers.whole_frames(input, format.bytes_per_frame());
        if !frames.is_empty() {
            let samples = resampler.process(&decode_samples(format.encoding, &frames));
            encode_samples(format.encoding, &samples, self.buffers.output_mut());
        }
        input.len()
    }

    fn queue_end_of_stream(&mut self) {
        if !self.buffers.queue_end_of_stream() {
            return;
        }
        if let (Some(format), Some(resampler)) = (self.format, self.resampler.as_mut()) {
            let tail = resampler.finish();
            encode_samples(format.encoding, &tail, self.buffers.output_mut());
        }
    }

    fn take_output(&mut self) -> PcmCursor {
        self.buffers.take_output()
    }

    fn is_ended(&self) -> bool {
        self.buffers.is_ended()
    }

    fn flush(&mut self) {
        self.buffers.flush();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    fn reset(&mut self) {
        self.flush();
        self.format = None;
        self.resampler = None;
    }
}
