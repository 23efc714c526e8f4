//! Synthesized silence for segments without decoded media.

use super::PcmCursor;
use crate::format::AudioFormat;

/// Produces silent PCM in a fixed format.
///
/// Durations are accumulated with [`add_silence`](Self::add_silence) and
/// handed out in reusable chunks of at most `chunk_frames` frames.
#[derive(Debug)]
pub struct SilenceGenerator {
    format: AudioFormat,
    chunk_bytes: usize,
    remaining_bytes: u64,
    buffer: PcmCursor,
}

impl SilenceGenerator {
    /// Create a generator for `format`.
    pub fn new(format: AudioFormat, chunk_frames: usize) -> Self {
        Self {
            format,
            chunk_bytes: chunk_frames.max(1) * format.bytes_per_frame(),
            remaining_bytes: 0,
            buffer: PcmCursor::default(),
        }
    }

    /// Format of the generated silence.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Owe `duration_us` more microseconds of silence.
    pub fn add_silence(&mut self, duration_us: i64) {
        self.remaining_bytes = self
            .remaining_bytes
            .saturating_add(self.format.bytes_for_duration_us(duration_us));
    }

    /// Silence bytes not yet handed out, including the current chunk.
    pub fn remaining_bytes(&self) -> u64 {
        self.remaining_bytes + self.buffer.remaining_len() as u64
    }

    /// Returns true while silence is still owed.
    pub fn has_remaining(&self) -> bool {
        self.remaining_bytes() > 0
    }

    /// Current chunk of silence.
    ///
    /// Once the caller has consumed the previous chunk, a new one is cut
    /// from the owed total.
    pub fn buffer(&mut self) -> &mut PcmCursor {
        if !self.buffer.has_remaining() && self.remaining_bytes > 0 {
            let len = self.remaining_bytes.min(self.chunk_bytes as u64) as usize;
            self.remaining_bytes -= len as u64;
            let silence = self.format.encoding.silence_byte();
            self.buffer.refill().resize(len, silence);
        }
        &mut self.buffer
    }

    /// Forget any silence still owed.
    pub fn clear(&mut self) {
        self.remaining_bytes = 0;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn test_chunks_cover_duration() {
        let mut generator = SilenceGenerator::new(AudioFormat::cd_quality(), 1024);
        generator.add_silence(100_000);
        assert_eq!(generator.remaining_bytes(), 4_410 * 4);

        let mut total = 0;
        while generator.has_remaining() {
            let buffer = generator.buffer();
            assert!(buffer.remaining_len() <= 1024 * 4);
            total += buffer.remaining_len();
            let len = buffer.remaining_len();
            buffer.advance(len);
        }
        assert_eq!(total, 4_410 * 4);
        assert!(!generator.buffer().has_remaining());
    }

    #[test]
    fn test_u8_silence_is_centered() {
        let mut generator = SilenceGenerator::new(AudioFormat::new(8_000, 1, SampleFormat::U8), 16);
        generator.add_silence(1_000);
        assert!(generator.buffer().remaining().iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_partial_consumption_keeps_chunk() {
        let mut generator = SilenceGenerator::new(AudioFormat::cd_quality(), 4);
        generator.add_silence(1_000_000);
        generator.buffer().advance(6);
        assert_eq!(generator.buffer().remaining_len(), 10);
        generator.clear();
        assert!(!generator.has_remaining());
    }

    #[test]
    fn test_huge_duration_saturates() {
        let format = AudioFormat::new(u32::MAX, 2, SampleFormat::S16Le);
        let mut generator = SilenceGenerator::new(format, 1024);
        generator.add_silence(i64::MAX);
        generator.add_silence(i64::MAX);
        assert_eq!(generator.remaining_bytes(), u64::MAX);
        assert_eq!(generator.buffer().remaining_len(), 1024 * 4);
    }
}
