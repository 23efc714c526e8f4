//! A single output stream assembled from a sequence of segments.

use super::buffer::{BufferPool, InputBuffer};
use super::change::{SegmentChange, SegmentConfig, SegmentMailbox, SegmentSource};
use super::defaults::{DEFAULT_INPUT_BUFFER_COUNT, DEFAULT_SILENCE_CHUNK_FRAMES};
use crate::audio::{
    AudioProcessingPipeline, AudioProcessor, ChannelMixingStage, PcmCursor, ResampleStage,
    SampleFormatStage, SilenceGenerator,
};
use crate::converters::ChannelMixingMatrix;
use crate::error::{Error, Result};
use crate::format::{AudioFormat, MediaFormat, OutputFormatRequest};
use crate::observability;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`SegmentStreamInput`].
#[derive(Debug, Clone)]
pub struct SegmentInputConfig {
    /// Number of input buffers shared with the producer.
    pub buffer_count: usize,
    /// Frames of silence handed out per output pull.
    pub silence_chunk_frames: usize,
    /// Name used in logs and metric labels.
    pub name: String,
}

impl Default for SegmentInputConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_INPUT_BUFFER_COUNT,
            silence_chunk_frames: DEFAULT_SILENCE_CHUNK_FRAMES,
            name: "audio".to_string(),
        }
    }
}

impl SegmentInputConfig {
    /// Set the number of input buffers.
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set the silence chunk size in frames.
    pub fn with_silence_chunk_frames(mut self, frames: usize) -> Self {
        self.silence_chunk_frames = frames;
        self
    }

    /// Set the name used in logs and metrics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(Error::Config("buffer_count must be non-zero".into()));
        }
        if self.silence_chunk_frames == 0 {
            return Err(Error::Config("silence_chunk_frames must be non-zero".into()));
        }
        Ok(())
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle of a [`SegmentStreamInput`].
///
/// ```text
/// AwaitingFirstSegment ──> Streaming <──> ReconfiguringAtBoundary
///                              │
///                              v
///                          Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// No segment change has been processed yet.
    AwaitingFirstSegment,
    /// Output flows from the current segment.
    Streaming,
    /// A segment change is pending and prior data is draining.
    ReconfiguringAtBoundary,
    /// All data has been output and end-of-stream was observed.
    Finished,
}

/// Counters kept by a [`SegmentStreamInput`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    /// Segment changes that took effect.
    pub segments_configured: u64,
    /// Bytes the consumer took from output chunks.
    pub bytes_output: u64,
    /// Input buffers returned to the pool after use.
    pub buffers_processed: u64,
}

struct Shared {
    name: String,
    pool: BufferPool,
    mailbox: SegmentMailbox,
    finished: AtomicBool,
}

// ============================================================================
// Producer side
// ============================================================================

/// Producer half of a [`SegmentStreamInput`].
///
/// Used from the decoding thread to post segment changes and fill input
/// buffers. Dropping the handle returns any acquired buffer to the pool.
pub struct SegmentInputHandle {
    shared: Arc<Shared>,
    acquired: Option<InputBuffer>,
}

impl SegmentInputHandle {
    /// Announce the next segment.
    ///
    /// Fails when the segment has neither media nor a known duration, when
    /// its decoded format is not usable audio, when a previous change has not
    /// been consumed yet, or once the input has finished.
    pub fn notify_segment_change(&self, change: SegmentChange) -> Result<()> {
        if self.shared.finished.load(Ordering::Acquire) {
            return Err(Error::InvalidState(format!(
                "{}: segment change after the input finished",
                self.shared.name
            )));
        }
        let source = change.source()?;
        tracing::debug!(
            "{}: segment change posted ({:?}, last: {})",
            self.shared.name,
            source,
            change.is_last()
        );
        self.shared.mailbox.post(change)
    }

    /// Get an empty buffer to fill.
    ///
    /// Returns `None` while a segment change is pending or when every buffer
    /// is in use. Repeated calls return the same buffer until it is submitted.
    pub fn acquire_input_buffer(&mut self) -> Option<&mut InputBuffer> {
        if self.shared.mailbox.is_pending() {
            return None;
        }
        if self.acquired.is_none() {
            self.acquired = self.shared.pool.try_take_available();
            if self.acquired.is_some() {
                observability::record_input_buffers_available(
                    &self.shared.name,
                    self.shared.pool.available(),
                );
            }
        }
        self.acquired.as_mut()
    }

    /// Queue the acquired buffer for processing.
    pub fn submit_input_buffer(&mut self) -> Result<()> {
        if self.shared.mailbox.is_pending() {
            return Err(Error::InvalidState(format!(
                "{}: buffer submitted while a segment change is pending",
                self.shared.name
            )));
        }
        let buffer = self.acquired.take().ok_or_else(|| {
            Error::InvalidState(format!("{}: no input buffer acquired", self.shared.name))
        })?;
        tracing::trace!(
            "{}: submit buffer {} ({} bytes at {}us{})",
            self.shared.name,
            buffer.slot(),
            buffer.data().len(),
            buffer.time_us(),
            if buffer.is_end_of_stream() { ", eos" } else { "" }
        );
        self.shared.pool.submit(buffer)
    }

    /// Number of buffers the producer could acquire right now.
    pub fn available_buffers(&self) -> usize {
        self.shared.pool.available()
    }
}

impl Drop for SegmentInputHandle {
    fn drop(&mut self) {
        if let Some(buffer) = self.acquired.take() {
            if let Err(e) = self.shared.pool.recycle(buffer) {
                tracing::warn!("{}: failed to return acquired buffer: {}", self.shared.name, e);
            }
        }
    }
}

impl std::fmt::Debug for SegmentInputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentInputHandle")
            .field("name", &self.shared.name)
            .field("acquired", &self.acquired.as_ref().map(InputBuffer::slot))
            .finish()
    }
}

// ============================================================================
// Output
// ============================================================================

/// Output ready for the consumer, borrowed from the input.
///
/// Bytes not consumed here are returned again by the next
/// [`SegmentStreamInput::produce_output`].
pub struct OutputChunk<'a> {
    cursor: Option<&'a mut PcmCursor>,
    bytes_output: &'a mut u64,
    name: &'a str,
}

impl OutputChunk<'_> {
    /// The unconsumed bytes.
    pub fn data(&self) -> &[u8] {
        match self.cursor.as_deref() {
            Some(cursor) => cursor.remaining(),
            None => &[],
        }
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.cursor.as_deref().map_or(0, PcmCursor::remaining_len)
    }

    /// Returns true if no output is ready.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark `count` bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if `count > len()`.
    pub fn consume(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let Some(cursor) = self.cursor.as_deref_mut() else {
            panic!("consume on an empty output chunk");
        };
        cursor.advance(count);
        *self.bytes_output += count as u64;
        observability::record_output_bytes(self.name, count as u64);
    }

    /// Consume everything, returning a copy of the bytes.
    pub fn consume_all(&mut self) -> Vec<u8> {
        let data = self.data().to_vec();
        self.consume(data.len());
        data
    }
}

impl std::fmt::Debug for OutputChunk<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputChunk")
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSource {
    Pipeline,
    Silence,
    InputBuffer,
    Empty,
}

// ============================================================================
// Processing side
// ============================================================================

/// Presents a sequence of audio segments as one continuous PCM stream.
///
/// The producer fills input buffers and announces segment boundaries
/// through a [`SegmentInputHandle`]. The processing thread pulls output
/// with [`produce_output`](Self::produce_output), which also applies a
/// pending boundary once all data of the previous segment has drained.
///
/// The output format is fixed by the first pipeline for the lifetime of the
/// input; every later segment is converted to it.
///
/// # Example
///
/// ```rust,ignore
/// let mut input = SegmentStreamInput::new(request, SegmentConfig::new(), &format, config)?;
/// let mut handle = input.input_handle();
///
/// handle.notify_segment_change(SegmentChange::decoded(format, Some(duration_us)))?;
/// if let Some(buffer) = handle.acquire_input_buffer() {
///     buffer.data_mut().extend_from_slice(&pcm);
///     handle.submit_input_buffer()?;
/// }
///
/// let mut chunk = input.produce_output()?;
/// let written = sink.write(chunk.data());
/// chunk.consume(written);
/// ```
pub struct SegmentStreamInput {
    shared: Arc<Shared>,
    output_format: AudioFormat,
    pipeline: AudioProcessingPipeline,
    silence: SilenceGenerator,
    /// Buffer being fed into an operational pipeline.
    current_input: Option<InputBuffer>,
    /// Buffer whose data is handed out directly while the pipeline is inert.
    output_buffer: Option<InputBuffer>,
    processed_first_change: bool,
    received_end_of_stream: bool,
    end_of_stream_after_silence: bool,
    stats: InputStats,
}

impl SegmentStreamInput {
    /// Create an input for segments initially decoded as `input_format`.
    ///
    /// The processing pipeline is built from `first_segment` and the output
    /// format it produces becomes the fixed output format. Fails with
    /// [`Error::UnhandledAudioFormat`] if `requested_output` cannot be met.
    pub fn new(
        requested_output: OutputFormatRequest,
        first_segment: SegmentConfig,
        input_format: &MediaFormat,
        config: SegmentInputConfig,
    ) -> Result<Self> {
        config.validate()?;
        let input_audio = AudioFormat::try_from(input_format)?;

        let (mut pipeline, output_format) =
            build_pipeline(first_segment, input_audio, &requested_output)?;
        pipeline.flush();

        tracing::info!(
            "{}: created ({} -> {}, {} processing stages, {} buffers)",
            config.name,
            input_audio,
            output_format,
            pipeline.active_stage_count(),
            config.buffer_count
        );

        let shared = Arc::new(Shared {
            pool: BufferPool::new(config.buffer_count)?,
            mailbox: SegmentMailbox::new(),
            finished: AtomicBool::new(false),
            name: config.name,
        });
        observability::record_input_buffers_available(&shared.name, shared.pool.available());

        Ok(Self {
            shared,
            output_format,
            pipeline,
            silence: SilenceGenerator::new(input_audio, config.silence_chunk_frames),
            current_input: None,
            output_buffer: None,
            processed_first_change: false,
            received_end_of_stream: false,
            end_of_stream_after_silence: false,
            stats: InputStats::default(),
        })
    }

    /// Create a producer handle.
    pub fn input_handle(&self) -> SegmentInputHandle {
        SegmentInputHandle {
            shared: Arc::clone(&self.shared),
            acquired: None,
        }
    }

    /// Name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The fixed output format.
    pub fn output_format(&self) -> AudioFormat {
        self.output_format
    }

    /// Counters for this input.
    pub fn stats(&self) -> InputStats {
        self.stats
    }

    /// Pull the next chunk of output.
    ///
    /// Returns an empty chunk when nothing is ready. When no data is left and
    /// a segment change is pending, the change is applied before returning.
    /// Configuration errors from that change are returned here; the change
    /// is dropped and the previous pipeline stays in place.
    pub fn produce_output(&mut self) -> Result<OutputChunk<'_>> {
        let source = {
            let _span = observability::span_segment_input(&self.shared.name).entered();
            self.next_output()?
        };

        let cursor = match source {
            OutputSource::Pipeline => Some(self.pipeline.output()),
            OutputSource::Silence => Some(self.silence.buffer()),
            OutputSource::InputBuffer => self.output_buffer.as_mut().map(|b| &mut b.data),
            OutputSource::Empty => None,
        };
        Ok(OutputChunk {
            cursor,
            bytes_output: &mut self.stats.bytes_output,
            name: &self.shared.name,
        })
    }

    /// Returns true once all data was output and end-of-stream observed.
    ///
    /// Stays true once reached.
    pub fn is_finished(&self) -> bool {
        if self.shared.finished.load(Ordering::Acquire) {
            return true;
        }
        if self.shared.mailbox.is_pending() || self.has_data_to_output() {
            return false;
        }
        let finished = self.received_end_of_stream || self.end_of_stream_after_silence;
        if finished {
            tracing::info!(
                "{}: finished after {} bytes",
                self.shared.name,
                self.stats.bytes_output
            );
            self.shared.finished.store(true, Ordering::Release);
        }
        finished
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        if self.is_finished() {
            StreamState::Finished
        } else if !self.processed_first_change {
            StreamState::AwaitingFirstSegment
        } else if self.shared.mailbox.is_pending() {
            StreamState::ReconfiguringAtBoundary
        } else {
            StreamState::Streaming
        }
    }

    /// Tear down processing and return held buffers to the pool.
    pub fn release(mut self) {
        self.pipeline.reset();
        self.silence.clear();
        for buffer in [self.current_input.take(), self.output_buffer.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.shared.pool.recycle(buffer) {
                tracing::warn!("{}: failed to return buffer on release: {}", self.shared.name, e);
            }
        }
        tracing::debug!("{}: released", self.shared.name);
    }

    fn next_output(&mut self) -> Result<OutputSource> {
        let source = self.output_source()?;
        if source != OutputSource::Empty {
            return Ok(source);
        }

        // Observe the pending change before checking for data: once it is
        // visible, every buffer submitted ahead of it is already queued.
        if self.shared.mailbox.is_pending() && !self.has_data_to_output() {
            self.configure_for_pending_change()?;
        }
        Ok(OutputSource::Empty)
    }

    fn output_source(&mut self) -> Result<OutputSource> {
        if !self.processed_first_change {
            return Ok(OutputSource::Empty);
        }

        if !self.pipeline.is_operational() {
            return self.feed_output_from_input();
        }

        while self.feed_pipeline_from_input()? {}
        if self.pipeline.has_output() {
            Ok(OutputSource::Pipeline)
        } else {
            Ok(OutputSource::Empty)
        }
    }

    /// Push as much input as the pipeline accepts. Returns true if a whole
    /// input unit was consumed and feeding should continue.
    fn feed_pipeline_from_input(&mut self) -> Result<bool> {
        if self.silence.has_remaining() {
            let data = self.silence.buffer();
            let consumed = self.pipeline.queue_input(data.remaining());
            data.advance(consumed);
            if data.has_remaining() {
                return Ok(false);
            }
            if !self.silence.has_remaining() {
                self.pipeline.queue_end_of_stream();
                return Ok(false);
            }
            return Ok(true);
        }

        let change_pending = self.shared.mailbox.is_pending();
        if self.current_input.is_none() {
            self.current_input = self.shared.pool.try_take_pending();
        }
        let Some(buffer) = self.current_input.as_mut() else {
            if change_pending {
                self.pipeline.queue_end_of_stream();
            }
            return Ok(false);
        };

        if buffer.is_end_of_stream() {
            self.pipeline.queue_end_of_stream();
            self.received_end_of_stream = true;
            self.recycle_current_input()?;
            return Ok(false);
        }

        let consumed = self.pipeline.queue_input(buffer.data.remaining());
        buffer.data.advance(consumed);
        if buffer.data.has_remaining() {
            return Ok(false);
        }
        self.recycle_current_input()?;
        Ok(true)
    }

    /// Hand out input data directly, without copying.
    fn feed_output_from_input(&mut self) -> Result<OutputSource> {
        if self.silence.has_remaining() {
            return Ok(OutputSource::Silence);
        }

        if self
            .output_buffer
            .as_ref()
            .is_some_and(|b| b.data.has_remaining())
        {
            return Ok(OutputSource::InputBuffer);
        }
        // Fully drained, so the buffer may be refilled
        self.recycle_output_buffer()?;

        let Some(buffer) = self.shared.pool.try_take_pending() else {
            return Ok(OutputSource::Empty);
        };
        self.received_end_of_stream = buffer.is_end_of_stream();
        if self.received_end_of_stream || !buffer.data.has_remaining() {
            self.recycle(buffer)?;
            return Ok(OutputSource::Empty);
        }

        self.output_buffer = Some(buffer);
        Ok(OutputSource::InputBuffer)
    }

    fn has_data_to_output(&self) -> bool {
        if !self.processed_first_change {
            return false;
        }
        if self
            .output_buffer
            .as_ref()
            .is_some_and(|b| b.data.has_remaining())
        {
            return true;
        }
        if self.current_input.is_some() || self.silence.has_remaining() {
            return true;
        }
        if self.shared.pool.has_pending() {
            return true;
        }
        self.pipeline.is_operational() && !self.pipeline.is_ended()
    }

    fn configure_for_pending_change(&mut self) -> Result<()> {
        let Some(change) = self.shared.mailbox.take() else {
            return Ok(());
        };
        let is_last = change.is_last();
        let source = change.source()?;

        let input_format = match source {
            SegmentSource::Decoded(format) => format,
            SegmentSource::Silence { .. } => self.silence.format(),
        };

        if self.processed_first_change {
            let required = OutputFormatRequest::from(self.output_format);
            let (pipeline, _) = build_pipeline(change.into_config(), input_format, &required)?;
            let mut previous = std::mem::replace(&mut self.pipeline, pipeline);
            previous.reset();
        }

        if let SegmentSource::Silence { duration_us } = source {
            self.silence.add_silence(duration_us);
            if is_last {
                self.end_of_stream_after_silence = true;
            }
        }

        self.recycle_output_buffer()?;
        self.pipeline.flush();
        self.received_end_of_stream = false;
        self.processed_first_change = true;
        self.stats.segments_configured += 1;

        observability::record_segment_configured(&self.shared.name);
        observability::trace_segment_change(
            &self.shared.name,
            &input_format,
            matches!(source, SegmentSource::Silence { .. }),
            is_last,
        );
        Ok(())
    }

    fn recycle_current_input(&mut self) -> Result<()> {
        match self.current_input.take() {
            Some(buffer) => self.recycle(buffer),
            None => Ok(()),
        }
    }

    fn recycle_output_buffer(&mut self) -> Result<()> {
        match self.output_buffer.take() {
            Some(buffer) => self.recycle(buffer),
            None => Ok(()),
        }
    }

    fn recycle(&mut self, buffer: InputBuffer) -> Result<()> {
        tracing::trace!("{}: recycle buffer {}", self.shared.name, buffer.slot());
        self.shared.pool.recycle(buffer)?;
        self.stats.buffers_processed += 1;
        observability::record_input_buffers_available(
            &self.shared.name,
            self.shared.pool.available(),
        );
        Ok(())
    }
}

impl std::fmt::Debug for SegmentStreamInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStreamInput")
            .field("name", &self.shared.name)
            .field("output_format", &self.output_format)
            .field("pipeline", &self.pipeline)
            .field("pool", &self.shared.pool)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Build the processing chain for one segment.
///
/// Effects run first, followed by the conversions needed to meet `required`.
/// Returns the pipeline (configured, not yet flushed) and its output format.
fn build_pipeline(
    config: SegmentConfig,
    input_format: AudioFormat,
    required: &OutputFormatRequest,
) -> Result<(AudioProcessingPipeline, AudioFormat)> {
    let mut stages: Vec<Box<dyn AudioProcessor>> = config.into_effects();

    if let Some(sample_rate) = required.sample_rate {
        stages.push(Box::new(
            ResampleStage::new().with_output_sample_rate(sample_rate),
        ));
    }

    if let Some(channels @ (1 | 2)) = required.channel_count {
        stages.push(Box::new(
            ChannelMixingStage::new()
                .with_matrix(ChannelMixingMatrix::create(1, channels)?)
                .with_matrix(ChannelMixingMatrix::create(2, channels)?),
        ));
    }

    if let Some(encoding) = required.encoding {
        stages.push(Box::new(SampleFormatStage::new(encoding)));
    }

    let mut pipeline = AudioProcessingPipeline::new(stages);
    let output_format = pipeline.configure(input_format)?;
    if !required.matches(&output_format) {
        return Err(Error::unhandled_format(
            input_format,
            "audio can not be modified to match downstream format",
        ));
    }
    Ok((pipeline, output_format))
}
