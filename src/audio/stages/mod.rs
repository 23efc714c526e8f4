//! Built-in audio stages.
//!
//! Every stage converts through the normalized `f64` sample representation
//! in [`crate::converters`] and keeps trailing partial frames for the next
//! call via [`StageBuffers`](super::StageBuffers).

mod channel_mix;
mod gain;
mod resample;
mod sample_format;

pub use channel_mix::ChannelMixingStage;
pub use gain::GainStage;
pub use resample::ResampleStage;
pub use sample_format::SampleFormatStage;
