//! Pure sample-level audio conversions.
//!
//! These are the building blocks of the processing stages in
//! [`crate::audio`]. They know nothing about streaming or end-of-stream;
//! stages wrap them with buffering.
//!
//! - [`AudioConvert`]: Sample format conversion (S16 ↔ F32, etc.)
//! - [`AudioResample`]: Streaming sample rate conversion
//! - [`ChannelMixingMatrix`]: Channel layout conversion (mono ↔ stereo, etc.)

mod audio;
mod resample;

pub use audio::{
    AudioConvert, ChannelMixingMatrix, decode_samples, encode_samples, read_normalized,
    write_normalized,
};
pub use resample::AudioResample;
