//! Segment stream input.
//!
//! Turns a sequence of audio segments, each decoded in its own format and
//! possibly carrying its own effects, into one continuous PCM stream in a
//! fixed output format. Segments without media are filled with silence.
//!
//! The producer side ([`SegmentInputHandle`]) and the processing side
//! ([`SegmentStreamInput`]) run on different threads and share only a
//! lock-free buffer pool and a single-slot mailbox for segment changes.

mod buffer;
mod change;
mod input;

pub use buffer::{BufferPool, InputBuffer};
pub use change::{SegmentChange, SegmentConfig, SegmentMailbox, SegmentSource};
pub use input::{
    InputStats, OutputChunk, SegmentInputConfig, SegmentInputHandle, SegmentStreamInput,
    StreamState,
};

/// Default values for segment inputs.
pub mod defaults {
    /// Input buffers shared with the producer.
    pub const DEFAULT_INPUT_BUFFER_COUNT: usize = 10;

    /// Frames of silence handed out per output pull.
    pub const DEFAULT_SILENCE_CHUNK_FRAMES: usize = 1024;
}
