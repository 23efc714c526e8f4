//! PCM encoding conversion stage.

use crate::audio::{AudioProcessor, PcmCursor, StageBuffers};
use crate::converters::AudioConvert;
use crate::error::Result;
use crate::format::{AudioFormat, SampleFormat};

/// Converts samples to a fixed encoding. Active iff encodings differ.
#[derive(Debug)]
pub struct SampleFormatStage {
    target: SampleFormat,
    input: Option<AudioFormat>,
    converter: Option<AudioConvert>,
    buffers: StageBuffers,
}

impl SampleFormatStage {
    /// Create a stage converting to `target`.
    pub fn new(target: SampleFormat) -> Self {
        Self {
            target,
            input: None,
            converter: None,
            buffers: StageBuffers::default(),
        }
    }
}

impl AudioProcessor for SampleFormatStage {
    fn name(&self) -> &str {
        "sample-format"
    }

    fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        self.input = Some(input);
        if input.encoding == self.target {
            self.converter = None;
            return Ok(input);
        }
        self.converter = Some(AudioConvert::new(input.encoding, self.target));
        Ok(AudioFormat {
            encoding: self.target,
            ..input
        })
    }

    fn is_active(&self) -> bool {
        self.converter.is_some()
    }

    fn queue_input(&mut self, input: &[u8]) -> usize {
        let (Some(format), Some(converter)) = (self.input, self.converter) else {
            return 0;
        };
        if self.buffers.input_ended() {
            return 0;
        }

        let frames = self.buffers.whole_frames(input, format.bytes_per_frame());
        if let Err(e) = converter.convert(&frames, self.buffers.output_mut()) {
            // Whole frames are always sample aligned
            tracing::error!("sample format conversion failed: {}", e);
        }
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
        self.input = None;
        self.converter = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_u8_to_s16() {
        let mut stage = SampleFormatStage::new(SampleFormat::S16Le);
        let output = stage
            .configure(AudioFormat::new(8_000, 1, SampleFormat::U8))
            .unwrap();
        assert_eq!(output.encoding, SampleFormat::S16Le);
        assert!(stage.is_active());

        stage.queue_input(&[0x80, 0x80]);
        assert_eq!(stage.take_output().remaining(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_same_encoding_is_inactive() {
        let mut stage = SampleFormatStage::new(SampleFormat::S16Le);
        stage.configure(AudioFormat::cd_quality()).unwrap();
        assert!(!stage.is_active());
    }
}
