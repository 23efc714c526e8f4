//! Audio and media format descriptors.
//!
//! Three levels of description are used across the crate:
//!
//! - [`MediaFormat`]: what a decoder reports for a segment. Fields may be
//!   missing and the MIME type may not even be audio.
//! - [`AudioFormat`]: a fully specified PCM layout. Every processing stage
//!   works in terms of this type.
//! - [`OutputFormatRequest`]: what the downstream consumer asks for. Unset
//!   fields are left to whatever the processing chain produces.

use crate::error::{Error, Result};
use std::fmt;

/// MIME type prefix shared by all audio formats.
pub const AUDIO_MIME_PREFIX: &str = "audio/";

/// MIME type of decoded PCM audio.
pub const AUDIO_RAW: &str = "audio/raw";

const MICROS_PER_SECOND: u64 = 1_000_000;

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit (0-255, center at 128)
    U8,
    /// Signed 16-bit little-endian
    S16Le,
    /// Signed 16-bit big-endian
    S16Be,
    /// Signed 32-bit little-endian
    S32Le,
    /// 32-bit float little-endian (-1.0 to 1.0)
    F32Le,
    /// 64-bit float little-endian (-1.0 to 1.0)
    F64Le,
}

impl SampleFormat {
    /// Get the number of bytes per sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
            SampleFormat::S32Le | SampleFormat::F32Le => 4,
            SampleFormat::F64Le => 8,
        }
    }

    /// Returns true if this format uses floating point.
    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::F32Le | SampleFormat::F64Le)
    }

    /// Byte value that encodes digital silence in this format.
    pub fn silence_byte(&self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            _ => 0,
        }
    }
}

/// A fully specified PCM audio layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channel_count: u32,
    /// Sample encoding.
    pub encoding: SampleFormat,
}

impl AudioFormat {
    /// Create a new audio format.
    pub const fn new(sample_rate: u32, channel_count: u32, encoding: SampleFormat) -> Self {
        Self {
            sample_rate,
            channel_count,
            encoding,
        }
    }

    /// 44.1kHz stereo 16-bit, the usual silence and fallback layout.
    pub const fn cd_quality() -> Self {
        Self::new(44_100, 2, SampleFormat::S16Le)
    }

    /// Size of one interleaved frame in bytes.
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channel_count as usize
    }

    /// Number of whole frames covering `duration_us` microseconds.
    ///
    /// Negative durations count as zero; results saturate at `u64::MAX`.
    pub fn frames_for_duration_us(&self, duration_us: i64) -> u64 {
        let duration_us = duration_us.max(0) as u128;
        let frames = self.sample_rate as u128 * duration_us / MICROS_PER_SECOND as u128;
        u64::try_from(frames).unwrap_or(u64::MAX)
    }

    /// Number of bytes covering `duration_us` microseconds, saturating.
    pub fn bytes_for_duration_us(&self, duration_us: i64) -> u64 {
        self.frames_for_duration_us(duration_us)
            .saturating_mul(self.bytes_per_frame() as u64)
    }

    /// Check that the layout can be processed at all.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::unhandled_format(self, "sample rate must be non-zero"));
        }
        if self.channel_count == 0 {
            return Err(Error::unhandled_format(self, "channel count must be non-zero"));
        }
        Ok(())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{:?}",
            self.sample_rate, self.channel_count, self.encoding
        )
    }
}

impl TryFrom<&MediaFormat> for AudioFormat {
    type Error = Error;

    fn try_from(format: &MediaFormat) -> Result<Self> {
        let (Some(sample_rate), Some(channel_count), Some(encoding)) =
            (format.sample_rate, format.channel_count, format.pcm_encoding)
        else {
            return Err(Error::unhandled_format(
                format,
                "decoded format is missing PCM parameters",
            ));
        };
        let audio = AudioFormat::new(sample_rate, channel_count, encoding);
        audio.validate()?;
        Ok(audio)
    }
}

/// Output layout requested by a downstream consumer.
///
/// `None` fields are ignored when checking whether a processing chain
/// satisfies the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFormatRequest {
    /// Requested sample rate.
    pub sample_rate: Option<u32>,
    /// Requested channel count.
    pub channel_count: Option<u32>,
    /// Requested sample encoding.
    pub encoding: Option<SampleFormat>,
}

impl OutputFormatRequest {
    /// A request that accepts any output layout.
    pub fn any() -> Self {
        Self::default()
    }

    /// Request a sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Request a channel count.
    pub fn with_channel_count(mut self, channel_count: u32) -> Self {
        self.channel_count = Some(channel_count);
        self
    }

    /// Request a sample encoding.
    pub fn with_encoding(mut self, encoding: SampleFormat) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Check whether `format` satisfies every field that is set.
    pub fn matches(&self, format: &AudioFormat) -> bool {
        self.sample_rate.is_none_or(|rate| rate == format.sample_rate)
            && self
                .channel_count
                .is_none_or(|channels| channels == format.channel_count)
            && self.encoding.is_none_or(|encoding| encoding == format.encoding)
    }
}

impl From<AudioFormat> for OutputFormatRequest {
    fn from(format: AudioFormat) -> Self {
        Self {
            sample_rate: Some(format.sample_rate),
            channel_count: Some(format.channel_count),
            encoding: Some(format.encoding),
        }
    }
}

/// Format reported by an upstream decoder for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    /// MIME type of the decoded samples.
    pub sample_mime_type: String,
    /// Sample rate, if known.
    pub sample_rate: Option<u32>,
    /// Channel count, if known.
    pub channel_count: Option<u32>,
    /// PCM encoding, if the samples are PCM.
    pub pcm_encoding: Option<SampleFormat>,
}

impl MediaFormat {
    /// Decoded PCM audio with every parameter known.
    pub fn audio_raw(sample_rate: u32, channel_count: u32, encoding: SampleFormat) -> Self {
        Self {
            sample_mime_type: AUDIO_RAW.to_string(),
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            pcm_encoding: Some(encoding),
        }
    }

    /// A format with only a MIME type.
    pub fn with_mime_type(mime_type: impl Into<String>) -> Self {
        Self {
            sample_mime_type: mime_type.into(),
            sample_rate: None,
            channel_count: None,
            pcm_encoding: None,
        }
    }

    /// Returns true for `audio/*` MIME types.
    pub fn is_audio(&self) -> bool {
        self.sample_mime_type.starts_with(AUDIO_MIME_PREFIX)
    }
}

impl From<AudioFormat> for MediaFormat {
    fn from(format: AudioFormat) -> Self {
        Self::audio_raw(format.sample_rate, format.channel_count, format.encoding)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sample_mime_type)?;
        if let Some(rate) = self.sample_rate {
            write!(f, " {}Hz", rate)?;
        }
        if let Some(channels) = self.channel_count {
            write!(f, " {}ch", channels)?;
        }
        if let Some(encoding) = self.pcm_encoding {
            write!(f, " {:?}", encoding)?;
        }
        Ok(())
    }
}
