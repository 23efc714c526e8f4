//! Audio sample format conversion and channel mixing.
//!
//! Provides pure Rust implementations of audio format conversions. Samples
//! are converted through a normalized `f64` representation (-1.0 to 1.0).

use crate::error::{Error, Result};
use crate::format::SampleFormat;

/// Read a sample as normalized f64 (-1.0 to 1.0).
///
/// `offset` is a byte offset and must leave room for a whole sample.
pub fn read_normalized(format: SampleFormat, data: &[u8], offset: usize) -> f64 {
    match format {
        SampleFormat::U8 => (data[offset] as f64 - 128.0) / 128.0,
        SampleFormat::S16Le => {
            i16::from_le_bytes([data[offset], data[offset + 1]]) as f64 / 32768.0
        }
        SampleFormat::S16Be => {
            i16::from_be_bytes([data[offset], data[offset + 1]]) as f64 / 32768.0
        }
        SampleFormat::S32Le => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&data[offset..offset + 4]);
            i32::from_le_bytes(bytes) as f64 / 2147483648.0
        }
        SampleFormat::F32Le => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&data[offset..offset + 4]);
            f32::from_le_bytes(bytes) as f64
        }
        SampleFormat::F64Le => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[offset..offset + 8]);
            f64::from_le_bytes(bytes)
        }
    }
}

/// Write a normalized f64 (-1.0 to 1.0) in the given format.
pub fn write_normalized(format: SampleFormat, data: &mut [u8], offset: usize, value: f64) {
    let value = value.clamp(-1.0, 1.0);

    match format {
        SampleFormat::U8 => {
            data[offset] = ((value * 128.0) + 128.0).round().min(255.0) as u8;
        }
        SampleFormat::S16Le => {
            let v = (value * 32767.0).round() as i16;
            data[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::S16Be => {
            let v = (value * 32767.0).round() as i16;
            data[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
        }
        SampleFormat::S32Le => {
            let v = (value * 2147483647.0).round() as i32;
            data[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::F32Le => {
            data[offset..offset + 4].copy_from_slice(&(value as f32).to_le_bytes());
        }
        SampleFormat::F64Le => {
            data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        }
    }
}

/// Decode a run of whole samples into normalized values.
pub fn decode_samples(format: SampleFormat, data: &[u8]) -> Vec<f64> {
    let sample_size = format.bytes_per_sample();
    (0..data.len() / sample_size)
        .map(|i| read_normalized(format, data, i * sample_size))
        .collect()
}

/// Encode normalized values, appending them to `output`.
pub fn encode_samples(format: SampleFormat, samples: &[f64], output: &mut Vec<u8>) {
    let sample_size = format.bytes_per_sample();
    let start = output.len();
    output.resize(start + samples.len() * sample_size, 0);
    for (i, &sample) in samples.iter().enumerate() {
        write_normalized(format, output, start + i * sample_size, sample);
    }
}

/// Audio sample format converter.
///
/// Converts between different audio sample formats (S16, F32, etc.)
#[derive(Debug, Clone, Copy)]
pub struct AudioConvert {
    input_format: SampleFormat,
    output_format: SampleFormat,
}

impl AudioConvert {
    /// Create a new audio format converter.
    pub fn new(input_format: SampleFormat, output_format: SampleFormat) -> Self {
        Self {
            input_format,
            output_format,
        }
    }

    /// Get the input format.
    pub fn input_format(&self) -> SampleFormat {
        self.input_format
    }

    /// Get the output format.
    pub fn output_format(&self) -> SampleFormat {
        self.output_format
    }

    /// Calculate output size for given input size.
    pub fn output_size(&self, input_size: usize) -> usize {
        let samples = input_size / self.input_format.bytes_per_sample();
        samples * self.output_format.bytes_per_sample()
    }

    /// Convert samples, appending to `output`.
    ///
    /// Returns the number of bytes appended.
    pub fn convert(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let input_sample_size = self.input_format.bytes_per_sample();

        if input.len() % input_sample_size != 0 {
            return Err(Error::Config(format!(
                "Input size {} not aligned to sample size {}",
                input.len(),
                input_sample_size
            )));
        }

        // Same format - just copy
        if self.input_format == self.output_format {
            output.extend_from_slice(input);
            return Ok(input.len());
        }

        let before = output.len();
        let samples = decode_samples(self.input_format, input);
        encode_samples(self.output_format, &samples, output);
        Ok(output.len() - before)
    }
}

/// Mixing coefficients from one channel count to another.
///
/// Coefficients are stored row-major: one row per input channel, one
/// column per output channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMixingMatrix {
    input_channels: u32,
    output_channels: u32,
    coefficients: Vec<f32>,
}

impl ChannelMixingMatrix {
    /// Create a matrix from explicit coefficients.
    pub fn new(input_channels: u32, output_channels: u32, coefficients: Vec<f32>) -> Result<Self> {
        if input_channels == 0 || output_channels == 0 {
            return Err(Error::Config("Channels must be non-zero".into()));
        }
        let expected = (input_channels * output_channels) as usize;
        if coefficients.len() != expected {
            return Err(Error::Config(format!(
                "Mixing matrix for {} -> {} channels needs {} coefficients, got {}",
                input_channels,
                output_channels,
                expected,
                coefficients.len()
            )));
        }
        Ok(Self {
            input_channels,
            output_channels,
            coefficients,
        })
    }

    /// Default matrix between mono and stereo layouts.
    ///
    /// Only 1 and 2 channels are supported on either side.
    pub fn create(input_channels: u32, output_channels: u32) -> Result<Self> {
        let coefficients = match (input_channels, output_channels) {
            (1, 1) => vec![1.0],
            (1, 2) => vec![1.0, 1.0],
            (2, 1) => vec![0.5, 0.5],
            (2, 2) => vec![1.0, 0.0, 0.0, 1.0],
            _ => {
                return Err(Error::Config(format!(
                    "No default mixing matrix for {} -> {} channels",
                    input_channels, output_channels
                )));
            }
        };
        Self::new(input_channels, output_channels, coefficients)
    }

    /// Number of input channels.
    pub fn input_channels(&self) -> u32 {
        self.input_channels
    }

    /// Number of output channels.
    pub fn output_channels(&self) -> u32 {
        self.output_channels
    }

    /// Coefficient applied from `input` channel to `output` channel.
    pub fn get(&self, input: u32, output: u32) -> f32 {
        self.coefficients[(input * self.output_channels + output) as usize]
    }

    /// Returns a copy with every coefficient multiplied by `scale`.
    pub fn scale_by(&self, scale: f32) -> Self {
        Self {
            input_channels: self.input_channels,
            output_channels: self.output_channels,
            coefficients: self.coefficients.iter().map(|c| c * scale).collect(),
        }
    }

    /// True if the matrix leaves audio untouched.
    pub fn is_identity(&self) -> bool {
        if self.input_channels != self.output_channels {
            return false;
        }
        (0..self.input_channels).all(|i| {
            (0..self.output_channels).all(|o| {
                let expected = if i == o { 1.0 } else { 0.0 };
                self.get(i, o) == expected
            })
        })
    }

    /// Mix interleaved normalized samples.
    ///
    /// Any trailing partial frame in `input` is ignored.
    pub fn mix(&self, input: &[f64]) -> Vec<f64> {
        let in_channels = self.input_channels as usize;
        let out_channels = self.output_channels as usize;
        let frames = input.len() / in_channels;
        let mut output = vec![0.0; frames * out_channels];

        for (frame, out) in input
            .chunks_exact(in_channels)
            .zip(output.chunks_exact_mut(out_channels))
        {
            for (o, slot) in out.iter_mut().enumerate() {
                *slot = frame
                    .iter()
                    .enumerate()
                    .map(|(i, sample)| sample * self.get(i as u32, o as u32) as f64)
                    .sum();
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s16_to_f32() {
        let converter = AudioConvert::new(SampleFormat::S16Le, SampleFormat::F32Le);

        // S16 values: 0, 16384 (0.5), -16384 (-0.5), 32767 (~1.0)
        let mut input = Vec::new();
        for v in [0i16, 16384, -16384, 32767] {
            input.extend_from_slice(&v.to_le_bytes());
        }

        let mut output = Vec::new();
        let written = converter.convert(&input, &mut output).unwrap();
        assert_eq!(written, 16);
        assert_eq!(converter.output_size(input.len()), 16);

        let samples: Vec<f32> = output
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert!((samples[0] - 0.0).abs() < 0.001);
        assert!((samples[1] - 0.5).abs() < 0.001);
        assert!((samples[2] + 0.5).abs() < 0.001);
        assert!((samples[3] - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_same_format_copies() {
        let converter = AudioConvert::new(SampleFormat::S16Le, SampleFormat::S16Le);
        let mut output = vec![9u8];
        converter.convert(&[1, 2, 3, 4], &mut output).unwrap();
        assert_eq!(output, vec![9, 1, 2, 3, 4]);
    }

    #[test]
    fn test_misaligned_input_rejected() {
        let converter = AudioConvert::new(SampleFormat::S16Le, SampleFormat::F32Le);
        let mut output = Vec::new();
        assert!(converter.convert(&[0, 0, 0], &mut output).is_err());
    }

    #[test]
    fn test_u8_center_is_silence() {
        assert_eq!(read_normalized(SampleFormat::U8, &[128], 0), 0.0);
        let mut data = [0u8; 1];
        write_normalized(SampleFormat::U8, &mut data, 0, 0.0);
        assert_eq!(data[0], 128);
    }

    #[test]
    fn test_default_matrices() {
        assert!(ChannelMixingMatrix::create(2, 2).unwrap().is_identity());
        assert!(ChannelMixingMatrix::create(1, 1).unwrap().is_identity());
        assert!(!ChannelMixingMatrix::create(1, 2).unwrap().is_identity());
        assert!(ChannelMixingMatrix::create(6, 2).is_err());
    }

    #[test]
    fn test_mono_to_stereo_mix() {
        let matrix = ChannelMixingMatrix::create(1, 2).unwrap();
        assert_eq!(matrix.mix(&[0.25, -0.5]), vec![0.25, 0.25, -0.5, -0.5]);
    }

    #[test]
    fn test_stereo_to_mono_mix_averages() {
        let matrix = ChannelMixingMatrix::create(2, 1).unwrap();
        assert_eq!(matrix.mix(&[1.0, 0.0, 0.5, 0.5, 0.2]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_matrix_coefficient_count_checked() {
        assert!(ChannelMixingMatrix::new(2, 2, vec![1.0]).is_err());
        let scaled = ChannelMixingMatrix::create(2, 2).unwrap().scale_by(0.5);
        assert_eq!(scaled.get(0, 0), 0.5);
        assert!(!scaled.is_identity());
    }
}
