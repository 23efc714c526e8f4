//! Frame handoff between two adjacent stages.

use super::executor::FrameTaskExecutor;
use super::frame::{FrameConsumer, FrameProducer, TextureInfo};
use crate::error::{Error, Result};
use crate::observability::{self, ConnectorMetrics};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default wait before offering a rejected frame again.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a [`StageConnector`].
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Wait before offering a rejected frame again.
    pub retry_interval: Duration,
    /// Name used in logs and metric labels.
    pub name: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            name: "connector".to_string(),
        }
    }
}

impl ConnectorConfig {
    /// Set the retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the name used in logs and metrics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Whether a rejected delivery is waiting to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Deliveries are attempted as soon as they arrive.
    Idle,
    /// The downstream stage rejected the head of the queue and a single
    /// retry is scheduled. New arrivals only queue up behind it.
    AwaitingRetry,
}

/// Counters kept by a [`StageConnector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectorStats {
    /// Frames accepted downstream.
    pub delivered: u64,
    /// Delivery attempts rejected downstream.
    pub rejected: u64,
    /// Frames handed back to the producer.
    pub released: u64,
    /// End-of-stream signals forwarded downstream.
    pub streams_ended: u64,
    /// Deliveries dropped because the consumer returned an error.
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingDelivery {
    Frame {
        frame: TextureInfo,
        presentation_time_us: i64,
    },
    EndOfStream,
}

#[derive(Debug)]
struct ConnectorState {
    pending: VecDeque<PendingDelivery>,
    delivery: DeliveryState,
    stats: ConnectorStats,
}

struct Shared {
    producer: Arc<dyn FrameProducer>,
    consumer: Arc<dyn FrameConsumer>,
    executor: FrameTaskExecutor,
    config: ConnectorConfig,
    metrics: ConnectorMetrics,
    /// Only locked from executor tasks, apart from snapshot reads.
    state: Mutex<ConnectorState>,
}

/// Connects a producing stage to a consuming stage.
///
/// The three entry points may be called from any thread. Each posts a task
/// to the shared [`FrameTaskExecutor`], so all connector logic runs
/// serialized on its worker:
///
/// - frames and end-of-stream signals reach the consumer in arrival order;
/// - a rejected frame stays at the head of the queue and is offered again
///   after [`ConnectorConfig::retry_interval`], with exactly one retry
///   scheduled per rejection;
/// - end-of-stream is forwarded only after every frame queued before it;
/// - a delivery the consumer fails with an error is dropped, counted in
///   [`ConnectorStats::failed`] and reported to the executor's error
///   listener, and the queue behind it keeps flowing.
///
/// No internal lock is held while the producer or consumer is called, so
/// callbacks may query the connector.
///
/// Once the executor is released, queued deliveries and retries are
/// abandoned.
///
/// # Example
///
/// ```rust,ignore
/// let executor = FrameTaskExecutor::new(ExecutorConfig::default())?;
/// let connector = StageConnector::new(blur, overlay, executor.clone(), ConnectorConfig::default());
///
/// // On the blur stage's thread
/// connector.on_output_frame_available(texture, presentation_time_us)?;
/// connector.on_current_output_stream_ended()?;
///
/// // On the overlay stage's thread
/// connector.on_input_frame_processed(texture)?;
/// ```
#[derive(Clone)]
pub struct StageConnector {
    shared: Arc<Shared>,
}

impl StageConnector {
    /// Connect `producer` to `consumer`, running on `executor`.
    pub fn new(
        producer: Arc<dyn FrameProducer>,
        consumer: Arc<dyn FrameConsumer>,
        executor: FrameTaskExecutor,
        config: ConnectorConfig,
    ) -> Self {
        let metrics = ConnectorMetrics::new(&config.name);
        Self {
            shared: Arc::new(Shared {
                producer,
                consumer,
                executor,
                config,
                metrics,
                state: Mutex::new(ConnectorState {
                    pending: VecDeque::new(),
                    delivery: DeliveryState::Idle,
                    stats: ConnectorStats::default(),
                }),
            }),
        }
    }

    /// Name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The consumer finished reading `frame`: hand it back to the producer.
    pub fn on_input_frame_processed(&self, frame: TextureInfo) -> Result<()> {
        self.submit(move |shared| {
            shared.producer.release_output_frame(frame)?;
            shared.lock()?.stats.released += 1;
            Ok(())
        })
    }

    /// The producer has a new frame for the consumer.
    pub fn on_output_frame_available(
        &self,
        frame: TextureInfo,
        presentation_time_us: i64,
    ) -> Result<()> {
        self.submit(move |shared| {
            shared.enqueue(PendingDelivery::Frame {
                frame,
                presentation_time_us,
            })
        })
    }

    /// The producer's current stream has no more frames.
    pub fn on_current_output_stream_ended(&self) -> Result<()> {
        self.submit(|shared| shared.enqueue(PendingDelivery::EndOfStream))
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ConnectorStats {
        self.shared.lock_or_recover().stats
    }

    /// Deliveries not yet accepted downstream.
    pub fn pending_count(&self) -> usize {
        self.shared.lock_or_recover().pending.len()
    }

    /// Current delivery state.
    pub fn delivery_state(&self) -> DeliveryState {
        self.shared.lock_or_recover().delivery
    }

    fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&Arc<Shared>) -> Result<()> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let _span = observability::span_connector(&shared.config.name).entered();
            task(&shared)
        })
    }
}

impl std::fmt::Debug for StageConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageConnector")
            .field("name", &self.shared.config.name)
            .field("executor", &self.shared.executor)
            .field("state", &*self.shared.lock_or_recover())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, ConnectorState>> {
        self.state
            .lock()
            .map_err(|_| Error::InvalidState(format!("{}: state lock poisoned", self.config.name)))
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, ConnectorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enqueue(self: &Arc<Self>, delivery: PendingDelivery) -> Result<()> {
        {
            let mut state = self.lock()?;
            state.pending.push_back(delivery);
            if state.delivery == DeliveryState::AwaitingRetry {
                // The scheduled retry drains the queue
                return Ok(());
            }
        }
        self.deliver_pending()
    }

    fn retry(self: &Arc<Self>) -> Result<()> {
        self.lock()?.delivery = DeliveryState::Idle;
        self.deliver_pending()
    }

    /// Deliver from the head of the queue until it is empty or the
    /// consumer rejects a frame.
    ///
    /// Only worker tasks mutate the queue, so the head stays put while the
    /// lock is released around consumer calls. A delivery the consumer fails
    /// with an error is dropped and the rest of the queue still goes out;
    /// the first such error is returned.
    fn deliver_pending(self: &Arc<Self>) -> Result<()> {
        let mut first_error = None;

        loop {
            let Some(delivery) = self.lock()?.pending.front().copied() else {
                break;
            };

            let outcome = match delivery {
                PendingDelivery::Frame {
                    frame,
                    presentation_time_us,
                } => self
                    .consumer
                    .try_queue_input_frame(frame, presentation_time_us),
                PendingDelivery::EndOfStream => self
                    .consumer
                    .signal_end_of_current_input_stream()
                    .map(|()| true),
            };

            let mut state = self.lock()?;
            match outcome {
                Ok(true) => {
                    state.pending.pop_front();
                    match delivery {
                        PendingDelivery::Frame {
                            frame,
                            presentation_time_us,
                        } => {
                            state.stats.delivered += 1;
                            self.metrics.record_delivered();
                            tracing::trace!(
                                "{}: delivered frame {} at {}us",
                                self.config.name,
                                frame.tex_id,
                                presentation_time_us
                            );
                        }
                        PendingDelivery::EndOfStream => {
                            state.stats.streams_ended += 1;
                            tracing::debug!("{}: end of stream forwarded", self.config.name);
                        }
                    }
                }
                Ok(false) => {
                    state.stats.rejected += 1;
                    state.delivery = DeliveryState::AwaitingRetry;
                    drop(state);
                    self.metrics.record_rejected();
                    if let PendingDelivery::Frame {
                        presentation_time_us,
                        ..
                    } = delivery
                    {
                        observability::trace_frame_rejected(&self.config.name, presentation_time_us);
                    }

                    let shared = Arc::clone(self);
                    self.executor
                        .submit_after(self.config.retry_interval, move || {
                            let _span = observability::span_connector(&shared.config.name).entered();
                            shared.retry()
                        })?;
                    break;
                }
                Err(e) => {
                    state.pending.pop_front();
                    state.stats.failed += 1;
                    tracing::warn!(
                        "{}: dropping {:?} after consumer error: {}",
                        self.config.name,
                        delivery,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
