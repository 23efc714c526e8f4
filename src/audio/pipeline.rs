//! Ordered chain of audio stages.

use super::{AudioProcessor, PcmCursor};
use crate::error::{Error, Result};
use crate::format::AudioFormat;
use smallvec::SmallVec;

type StageIndices = SmallVec<[usize; 4]>;

/// Configuration computed by [`AudioProcessingPipeline::configure`] that
/// takes effect on the next flush.
#[derive(Debug)]
struct StagedConfiguration {
    active: StageIndices,
    input_format: AudioFormat,
    output_format: AudioFormat,
}

/// An ordered chain of [`AudioProcessor`] stages.
///
/// Only stages that report themselves active after configuration take part
/// in processing. A pipeline without active stages is *inert*: it accepts no
/// input and callers should bypass it.
///
/// Data moves forward stage by stage. A stage is only given new input once
/// the output it produced earlier has been fully consumed by the next stage,
/// so a slow tail propagates backpressure to the head and eventually to
/// [`queue_input`](Self::queue_input), which then consumes less than offered.
pub struct AudioProcessingPipeline {
    stages: Vec<Box<dyn AudioProcessor>>,
    staged: Option<StagedConfiguration>,
    active: StageIndices,
    /// Pending output of each active stage, aligned with `active`.
    outputs: SmallVec<[PcmCursor; 4]>,
    input_format: Option<AudioFormat>,
    output_format: Option<AudioFormat>,
    input_ended: bool,
    empty: PcmCursor,
}

impl AudioProcessingPipeline {
    /// Create a pipeline over `stages`, in processing order.
    pub fn new(stages: Vec<Box<dyn AudioProcessor>>) -> Self {
        Self {
            stages,
            staged: None,
            active: StageIndices::new(),
            outputs: SmallVec::new(),
            input_format: None,
            output_format: None,
            input_ended: false,
            empty: PcmCursor::default(),
        }
    }

    /// Configure every stage for `input` and return the resulting output format.
    ///
    /// The new configuration is only applied by the next [`flush`](Self::flush).
    pub fn configure(&mut self, input: AudioFormat) -> Result<AudioFormat> {
        input.validate()?;

        let mut format = input;
        let mut active = StageIndices::new();
        for (index, stage) in self.stages.iter_mut().enumerate() {
            let next = stage.configure(format)?;
            if stage.is_active() {
                next.validate().map_err(|_| {
                    Error::unhandled_format(
                        format,
                        format!("stage '{}' produced an invalid format", stage.name()),
                    )
                })?;
                format = next;
                active.push(index);
            }
        }

        self.staged = Some(StagedConfiguration {
            active,
            input_format: input,
            output_format: format,
        });
        Ok(format)
    }

    /// Apply any staged configuration and drop all buffered data.
    pub fn flush(&mut self) {
        if let Some(staged) = self.staged.take() {
            let names: Vec<&str> = staged
                .active
                .iter()
                .map(|&index| self.stages[index].name())
                .collect();
            tracing::debug!(
                "audio pipeline: {} -> {} via [{}]",
                staged.input_format,
                staged.output_format,
                names.join(", ")
            );
            self.active = staged.active;
            self.input_format = Some(staged.input_format);
            self.output_format = Some(staged.output_format);
        }

        self.outputs = self.active.iter().map(|_| PcmCursor::default()).collect();
        self.input_ended = false;
        for &index in &self.active {
            self.stages[index].flush();
        }
    }

    /// Input format of the applied configuration.
    pub fn input_format(&self) -> Option<AudioFormat> {
        self.input_format
    }

    /// Output format of the applied configuration.
    pub fn output_format(&self) -> Option<AudioFormat> {
        self.output_format
    }

    /// Returns true if at least one stage is active.
    pub fn is_operational(&self) -> bool {
        !self.active.is_empty()
    }

    /// Number of active stages.
    pub fn active_stage_count(&self) -> usize {
        self.active.len()
    }

    /// Push input, returning how many bytes were consumed.
    ///
    /// Consumes nothing when inert or after end-of-stream.
    pub fn queue_input(&mut self, input: &[u8]) -> usize {
        if !self.is_operational() || self.input_ended {
            return 0;
        }
        self.process_data(input)
    }

    /// Signal end-of-stream to the first stage. Later stages receive it
    /// once the stages before them have drained.
    pub fn queue_end_of_stream(&mut self) {
        if !self.is_operational() || self.input_ended {
            return;
        }
        self.input_ended = true;
        let first = self.active[0];
        self.stages[first].queue_end_of_stream();
    }

    /// Pending output of the final stage.
    ///
    /// Callers consume by advancing the returned cursor. When it is empty,
    /// buffered data is pushed through the chain first.
    pub fn output(&mut self) -> &mut PcmCursor {
        if !self.is_operational() {
            self.empty.clear();
            return &mut self.empty;
        }

        let last = self.active.len() - 1;
        if !self.outputs[last].has_remaining() {
            self.process_data(&[]);
        }
        &mut self.outputs[last]
    }

    /// Returns true if the final stage has output ready.
    pub fn has_output(&mut self) -> bool {
        self.output().has_remaining()
    }

    /// Returns true once end-of-stream has passed through every stage and
    /// all output has been consumed. Always false for an inert pipeline.
    pub fn is_ended(&self) -> bool {
        let Some(&last_stage) = self.active.last() else {
            return false;
        };
        let last = self.active.len() - 1;
        self.input_ended && self.stages[last_stage].is_ended() && !self.outputs[last].has_remaining()
    }

    /// Reset every stage and forget the configuration.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        self.staged = None;
        self.active.clear();
        self.outputs.clear();
        self.input_format = None;
        self.output_format = None;
        self.input_ended = false;
    }

    fn process_data(&mut self, input: &[u8]) -> usize {
        let last = self.active.len() - 1;
        let mut consumed = 0;
        let mut progress = true;

        while progress {
            progress = false;
            for index in 0..=last {
                if self.outputs[index].has_remaining() {
                    // Downstream has not taken this stage's output yet
                    continue;
                }

                let stage = self.active[index];
                if self.stages[stage].is_ended() {
                    if index < last {
                        let next = self.active[index + 1];
                        self.stages[next].queue_end_of_stream();
                    }
                    continue;
                }

                let queued = if index == 0 {
                    let queued = self.stages[stage].queue_input(&input[consumed..]);
                    consumed += queued;
                    queued
                } else {
                    let previous = &mut self.outputs[index - 1];
                    let queued = self.stages[stage].queue_input(previous.remaining());
                    previous.advance(queued);
                    queued
                };

                self.outputs[index] = self.stages[stage].take_output();
                progress |= queued > 0 || self.outputs[index].has_remaining();
            }
        }

        consumed
    }
}

impl std::fmt::Debug for AudioProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("AudioProcessingPipeline")
            .field("stages", &stages)
            .field("active", &self.active)
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("input_ended", &self.input_ended)
            .finish()
    }
}
