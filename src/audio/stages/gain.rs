//! Volume scaling effect.

use crate::audio::{AudioProcessor, PcmCursor, StageBuffers};
use crate::converters::{decode_samples, encode_samples};
use crate::error::Result;
use crate::format::AudioFormat;

/// Multiplies every sample by a constant gain. Active iff gain != 1.0.
#[derive(Debug)]
pub struct GainStage {
    gain: f64,
    format: Option<AudioFormat>,
    buffers: StageBuffers,
}

impl GainStage {
    /// Create a stage with the given linear gain.
    pub fn new(gain: f64) -> Self {
        Self {
            gain,
            format: None,
            buffers: StageBuffers::default(),
        }
    }

    /// Linear gain applied to samples.
    pub fn gain(&self) -> f64 {
        self.gain
    }
}

impl AudioProcessor for GainStage {
    fn name(&self) -> &str {
        "gain"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        self.format = Some(input);
        Ok(input)
    }

    fn is_active(&self) -> bool {
        self.format.is_some() && self.gain != 1.0
    }

    fn queue_input(&mut self, input: &[u8]) -> usize {
        let Some(format) = self.format else {
            return 0;
        };
        if self.buffers.input_ended() {
            return 0;
        }

        let frames = self.buffers.whole_frames(input, format.bytes_per_frame());
        let samples: Vec<f64> = decode_samples(format.encoding, &frames)
            .into_iter()
            .map(|sample| sample * self.gain)
            .collect();
        encode_samples(format.encoding, &samples, self.buffers.output_mut());
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn test_unity_gain_is_inactive() {
        let mut stage = GainStage::new(1.0);
        stage.configure(AudioFormat::cd_quality()).unwrap();
        assert!(!stage.is_active());
    }

    #[test]
    fn test_gain_scales_f32() {
        let mut stage = GainStage::new(0.5);
        stage
            .configure(AudioFormat::new(48_000, 1, SampleFormat::F32Le))
            .unwrap();
        stage.queue_input(&0.8f32.to_le_bytes());
        let output = stage.take_output();
        let value = f32::from_le_bytes(output.remaining().try_into().unwrap());
        assert!((value - 0.4).abs() < 1e-6);
    }
}
