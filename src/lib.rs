//! # Segue
//!
//! Data-flow core of a media transformation pipeline: the parts that move
//! buffers between stages while segments come and go.
//!
//! Segue provides two components:
//!
//! - **Segment stream input** ([`segment`]): presents a sequence of audio
//!   segments, each decoded in its own format and possibly silent, as one
//!   continuous PCM stream in a fixed output format. Per-segment processing
//!   chains are rebuilt at boundaries once the previous segment has drained.
//! - **Stage handoff** ([`handoff`]): connects two GPU-backed stages running
//!   on different threads, delivering frames in order, handing consumed
//!   frames back and retrying rejected deliveries on a serialized worker.
//!
//! ## Features
//!
//! - **Lock-free buffer pool**: fixed arena of input buffers moved between
//!   `kanal` queues, never aliased while read as output
//! - **Deferred reconfiguration**: boundaries are applied from the output
//!   pull path, never from the producer
//! - **Silence synthesis**: segments without media are filled with silence
//! - **Backpressure by rejection**: no call blocks; retries are scheduled on
//!   the connector's executor
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segue::prelude::*;
//!
//! let format = MediaFormat::audio_raw(44_100, 2, SampleFormat::S16Le);
//! let mut input = SegmentStreamInput::new(
//!     OutputFormatRequest::any().with_sample_rate(48_000),
//!     SegmentConfig::new(),
//!     &format,
//!     SegmentInputConfig::default(),
//! )?;
//!
//! let handle = input.input_handle();
//! handle.notify_segment_change(SegmentChange::decoded(format, Some(2_000_000)))?;
//!
//! let mut chunk = input.produce_output()?;
//! let pcm = chunk.consume_all();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audio;
pub mod converters;
pub mod error;
pub mod format;
pub mod handoff;
pub mod observability;
pub mod segment;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audio::{AudioProcessor, GainStage};
    pub use crate::error::{Error, Result};
    pub use crate::format::{AudioFormat, MediaFormat, OutputFormatRequest, SampleFormat};
    pub use crate::handoff::{
        ConnectorConfig, ExecutorConfig, FrameConsumer, FrameProducer, FrameTaskExecutor,
        StageConnector, TextureInfo,
    };
    pub use crate::segment::{
        SegmentChange, SegmentConfig, SegmentInputConfig, SegmentInputHandle, SegmentStreamInput,
        StreamState,
    };
}

pub use error::{Error, Result};
