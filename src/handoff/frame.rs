//! Texture frames and the stage interfaces that exchange them.

use crate::error::Result;

/// Handle to a GPU texture holding one frame.
///
/// Only identifies the texture; the pixels stay on the GPU and ownership is
/// tracked by which stage currently holds the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureInfo {
    /// Texture object id.
    pub tex_id: u32,
    /// Framebuffer object the texture is attached to.
    pub fbo_id: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TextureInfo {
    /// Create a texture handle.
    pub const fn new(tex_id: u32, fbo_id: u32, width: u32, height: u32) -> Self {
        Self {
            tex_id,
            fbo_id,
            width,
            height,
        }
    }
}

/// The upstream side of a connection: a stage that produced frames and
/// wants them back once the next stage is done reading them.
pub trait FrameProducer: Send + Sync {
    /// Take back a frame previously handed downstream.
    fn release_output_frame(&self, frame: TextureInfo) -> Result<()>;
}

/// The downstream side of a connection.
pub trait FrameConsumer: Send + Sync {
    /// Offer a frame.
    ///
    /// Returns `Ok(false)` when the stage cannot take a frame right now. The
    /// frame then remains with the caller, which must offer it again later.
    fn try_queue_input_frame(&self, frame: TextureInfo, presentation_time_us: i64)
    -> Result<bool>;

    /// Signal that the current input stream has no more frames.
    fn signal_end_of_current_input_stream(&self) -> Result<()>;
}
