//! Audio processing stages and the pipeline that chains them.
//!
//! A segment's audio passes through an [`AudioProcessingPipeline`] built from
//! [`AudioProcessor`] stages. Stages that would not change the audio drop out
//! at configuration time, and a pipeline left without stages is inert so the
//! caller can hand input straight to the output.
//!
//! # Example
//!
//! ```rust,ignore
//! use segue::audio::{AudioProcessingPipeline, GainStage, ResampleStage};
//! use segue::format::{AudioFormat, SampleFormat};
//!
//! let mut pipeline = AudioProcessingPipeline::new(vec![
//!     Box::new(GainStage::new(0.5)),
//!     Box::new(ResampleStage::new().with_output_sample_rate(48_000)),
//! ]);
//! let output_format = pipeline.configure(AudioFormat::cd_quality())?;
//! pipeline.flush();
//!
//! let consumed = pipeline.queue_input(&pcm);
//! let output = pipeline.output();
//! ```

mod cursor;
mod pipeline;
mod processor;
mod silence;
pub mod stages;

pub use cursor::PcmCursor;
pub use pipeline::AudioProcessingPipeline;
pub use processor::{AudioProcessor, StageBuffers};
pub use silence::SilenceGenerator;
pub use stages::{ChannelMixingStage, GainStage, ResampleStage, SampleFormatStage};
