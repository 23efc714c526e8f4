//! Audio sample rate conversion (resampling).
//!
//! Streaming linear interpolation over normalized interleaved samples. The
//! resampler carries its phase and the last input frame between calls, so a
//! stream can be fed in arbitrarily sized chunks without discontinuities at
//! chunk borders.

use crate::error::{Error, Result};

/// Audio resampler.
///
/// Converts audio between different sample rates.
#[derive(Debug, Clone)]
pub struct AudioResample {
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Input frames advanced per output frame.
    step: f64,
    /// Position of the next output frame, relative to `last_frame`
    /// (index 0) when present, otherwise to the first frame of the next chunk.
    position: f64,
    /// Last frame of the previous chunk, kept for interpolation.
    last_frame: Option<Vec<f64>>,
}

impl AudioResample {
    /// Create a new audio resampler.
    pub fn new(input_rate: u32, output_rate: u32, channels: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(Error::Config("Sample rates must be non-zero".into()));
        }
        if channels == 0 {
            return Err(Error::Config("Channels must be non-zero".into()));
        }

        Ok(Self {
            input_rate,
            output_rate,
            channels: channels as usize,
            step: input_rate as f64 / output_rate as f64,
            position: 0.0,
            last_frame: None,
        })
    }

    /// Get the input sample rate.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Approximate number of output frames for `input_frames` input frames.
    pub fn output_frames(&self, input_frames: usize) -> usize {
        (input_frames as f64 / self.step).ceil() as usize
    }

    /// Reset the resampler state.
    ///
    /// Call this when starting a new audio stream to clear history.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last_frame = None;
    }

    /// Resample a chunk of interleaved samples.
    ///
    /// Output for the final input frames is held back until more input
    /// arrives or [`finish`](Self::finish) is called.
    pub fn process(&mut self, input: &[f64]) -> Vec<f64> {
        let channels = self.channels;
        let frames_in = input.len() / channels;
        if frames_in == 0 {
            return Vec::new();
        }

        if self.input_rate == self.output_rate && self.last_frame.is_none() {
            return input[..frames_in * channels].to_vec();
        }

        let offset = usize::from(self.last_frame.is_some());
        let total = frames_in + offset;
        let last = self.last_frame.take().unwrap_or_default();
        let frame_at = |idx: usize| {
            if idx < offset {
                last.as_slice()
            } else {
                let start = (idx - offset) * channels;
                &input[start..start + channels]
            }
        };

        let mut output = Vec::with_capacity((self.output_frames(frames_in) + 1) * channels);
        while self.position + 1.0 < total as f64 {
            let idx = self.position.floor() as usize;
            let frac = self.position - idx as f64;
            let s0 = frame_at(idx);
            let s1 = frame_at(idx + 1);
            for ch in 0..channels {
                output.push(s0[ch] + frac * (s1[ch] - s0[ch]));
            }
            self.position += self.step;
        }

        // Rebase so the last input frame becomes index 0 of the next call
        self.position -= (total - 1) as f64;
        self.last_frame = Some(input[(frames_in - 1) * channels..frames_in * channels].to_vec());

        output
    }

    /// Emit the output still owed for the final input frame.
    pub fn finish(&mut self) -> Vec<f64> {
        let Some(last) = self.last_frame.take() else {
            return Vec::new();
        };

        let mut output = Vec::new();
        while self.position < 1.0 {
            output.extend_from_slice(&last);
            self.position += self.step;
        }
        self.position = 0.0;
        output
    }
}
