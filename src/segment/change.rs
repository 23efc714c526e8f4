//! Segment descriptors and the single-slot mailbox that carries them.

use crate::audio::AudioProcessor;
use crate::error::{Error, Result};
use crate::format::{AudioFormat, MediaFormat};

/// Per-segment processing configuration.
///
/// Effects run in order ahead of the format conversion stages.
#[derive(Default)]
pub struct SegmentConfig {
    effects: Vec<Box<dyn AudioProcessor>>,
}

impl SegmentConfig {
    /// A configuration without effects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an effect.
    pub fn with_effect(mut self, effect: impl AudioProcessor + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    /// Number of effects.
    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub(crate) fn into_effects(self) -> Vec<Box<dyn AudioProcessor>> {
        self.effects
    }
}

impl std::fmt::Debug for SegmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let effects: Vec<&str> = self.effects.iter().map(|e| e.name()).collect();
        f.debug_struct("SegmentConfig")
            .field("effects", &effects)
            .finish()
    }
}

/// Where a segment's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSource {
    /// Decoded PCM in the given format.
    Decoded(AudioFormat),
    /// Synthesized silence of the given length.
    Silence {
        /// Length of the silence in microseconds.
        duration_us: i64,
    },
}

/// Description of the next segment, posted by the producer at a boundary.
#[derive(Debug)]
pub struct SegmentChange {
    config: SegmentConfig,
    duration_us: Option<i64>,
    decoded_format: Option<MediaFormat>,
    is_last: bool,
}

impl SegmentChange {
    /// Describe a segment.
    ///
    /// `decoded_format` is `None` for segments without media, which are
    /// filled with silence for `duration_us`.
    pub fn new(
        config: SegmentConfig,
        duration_us: Option<i64>,
        decoded_format: Option<MediaFormat>,
        is_last: bool,
    ) -> Self {
        Self {
            config,
            duration_us,
            decoded_format,
            is_last,
        }
    }

    /// A decoded segment without effects.
    pub fn decoded(format: MediaFormat, duration_us: Option<i64>) -> Self {
        Self::new(SegmentConfig::default(), duration_us, Some(format), false)
    }

    /// A silent segment without effects.
    pub fn silence(duration_us: i64) -> Self {
        Self::new(SegmentConfig::default(), Some(duration_us), None, false)
    }

    /// Mark this as the final segment.
    pub fn last(mut self) -> Self {
        self.is_last = true;
        self
    }

    /// Replace the processing configuration.
    pub fn with_config(mut self, config: SegmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns true for the final segment.
    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Segment duration in microseconds, if known.
    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    /// Resolve where this segment's audio comes from.
    ///
    /// Fails when there is neither media nor a known duration, or when the
    /// decoded format is not usable PCM audio.
    pub fn source(&self) -> Result<SegmentSource> {
        match &self.decoded_format {
            None => {
                let duration_us = self.duration_us.ok_or_else(|| {
                    Error::Config(
                        "could not generate silent audio because duration is unknown".into(),
                    )
                })?;
                if duration_us < 0 {
                    return Err(Error::Config(format!(
                        "could not generate silent audio for negative duration {}us",
                        duration_us
                    )));
                }
                Ok(SegmentSource::Silence { duration_us })
            }
            Some(format) if !format.is_audio() => Err(Error::unhandled_format(
                format,
                "decoded format is not audio",
            )),
            Some(format) => Ok(SegmentSource::Decoded(AudioFormat::try_from(format)?)),
        }
    }

    pub(crate) fn into_config(self) -> SegmentConfig {
        self.config
    }
}

/// Single-slot handoff of the next [`SegmentChange`].
///
/// Backed by a `kanal` channel of capacity one: posting while a change is
/// still unconsumed is rejected instead of overwriting it.
pub struct SegmentMailbox {
    tx: kanal::Sender<SegmentChange>,
    rx: kanal::Receiver<SegmentChange>,
}

impl SegmentMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        let (tx, rx) = kanal::bounded(1);
        Self { tx, rx }
    }

    /// Post a change. Fails if one is already pending.
    pub fn post(&self, change: SegmentChange) -> Result<()> {
        match self.tx.try_send(change) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::InvalidState(
                "segment change posted while another is pending".into(),
            )),
            Err(_) => Err(Error::InvalidState("segment mailbox closed".into())),
        }
    }

    /// Take the pending change, if any.
    pub fn take(&self) -> Option<SegmentChange> {
        self.rx.try_recv().ok().flatten()
    }

    /// Returns true while a change is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Default for SegmentMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SegmentMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentMailbox")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::GainStage;
    use crate::format::SampleFormat;

    #[test]
    fn test_silence_needs_duration() {
        let change = SegmentChange::new(SegmentConfig::default(), None, None, false);
        let err = change.source().unwrap_err();
        assert!(err.is_configuration_error());

        let change = SegmentChange::silence(2_000_000);
        assert_eq!(
            change.source().unwrap(),
            SegmentSource::Silence {
                duration_us: 2_000_000
            }
        );
    }

    #[test]
    fn test_negative_silence_duration_rejected() {
        let err = SegmentChange::silence(-1).last().source().unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(
            SegmentChange::silence(0).source().unwrap(),
            SegmentSource::Silence { duration_us: 0 }
        );
    }

    #[test]
    fn test_non_audio_format_rejected() {
        let change = SegmentChange::decoded(MediaFormat::with_mime_type("video/avc"), None);
        assert!(matches!(
            change.source(),
            Err(Error::UnhandledAudioFormat { .. })
        ));
    }

    #[test]
    fn test_decoded_source() {
        let change =
            SegmentChange::decoded(MediaFormat::audio_raw(48_000, 2, SampleFormat::F32Le), None)
                .last();
        assert!(change.is_last());
        assert_eq!(
            change.source().unwrap(),
            SegmentSource::Decoded(AudioFormat::new(48_000, 2, SampleFormat::F32Le))
        );
    }

    #[test]
    fn test_mailbox_rejects_overwrite() {
        let mailbox = SegmentMailbox::new();
        mailbox.post(SegmentChange::silence(10)).unwrap();
        assert!(mailbox.is_pending());
        let err = mailbox.post(SegmentChange::silence(20)).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let change = mailbox.take().unwrap();
        assert_eq!(change.duration_us(), Some(10));
        assert!(!mailbox.is_pending());
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_config_effects() {
        let config = SegmentConfig::new().with_effect(GainStage::new(0.5));
        assert_eq!(config.effect_count(), 1);
        assert!(format!("{:?}", config).contains("gain"));
    }
}
