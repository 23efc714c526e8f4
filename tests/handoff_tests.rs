//! Integration tests for stage handoff.
//!
//! These tests verify that:
//! - Processed frames are handed back to the producing stage
//! - A rejected frame is retried before any later frame is offered
//! - End-of-stream reaches the consumer after every earlier frame
//! - Releasing the executor abandons pending retries
//! - A delivery failed by the consumer does not stall the queue

use segue::error::{Error, Result};
use segue::handoff::{
    ConnectorConfig, DeliveryState, ExecutorConfig, FrameConsumer, FrameProducer,
    FrameTaskExecutor, StageConnector, TextureInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Offered { pts: i64, accepted: bool },
    EndOfStream,
}

/// Producer that records which frames it got back.
#[derive(Default)]
struct RecordingProducer {
    released: Mutex<Vec<TextureInfo>>,
}

impl FrameProducer for RecordingProducer {
    fn release_output_frame(&self, frame: TextureInfo) -> Result<()> {
        self.released.lock().unwrap().push(frame);
        Ok(())
    }
}

/// Consumer that records every call and rejects according to a policy.
struct RecordingConsumer {
    events: Mutex<Vec<Event>>,
    reject: Box<dyn Fn(i64, usize) -> bool + Send + Sync>,
    attempts: AtomicUsize,
}

impl RecordingConsumer {
    fn accepting() -> Self {
        Self::rejecting_when(|_, _| false)
    }

    fn rejecting_when(reject: impl Fn(i64, usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            reject: Box::new(reject),
            attempts: AtomicUsize::new(0),
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn accepted(&self) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Offered {
                    pts,
                    accepted: true,
                } => Some(pts),
                _ => None,
            })
            .collect()
    }
}

impl FrameConsumer for RecordingConsumer {
    fn try_queue_input_frame(&self, _frame: TextureInfo, pts: i64) -> Result<bool> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let accepted = !(self.reject)(pts, attempt);
        self.events
            .lock()
            .unwrap()
            .push(Event::Offered { pts, accepted });
        Ok(accepted)
    }

    fn signal_end_of_current_input_stream(&self) -> Result<()> {
        self.events.lock().unwrap().push(Event::EndOfStream);
        Ok(())
    }
}

struct Fixture {
    producer: Arc<RecordingProducer>,
    consumer: Arc<RecordingConsumer>,
    executor: FrameTaskExecutor,
    connector: StageConnector,
}

fn fixture(consumer: RecordingConsumer) -> Fixture {
    init_tracing();
    let producer = Arc::new(RecordingProducer::default());
    let consumer = Arc::new(consumer);
    let executor =
        FrameTaskExecutor::new(ExecutorConfig::default().with_name("handoff-test")).unwrap();
    let connector = StageConnector::new(
        producer.clone(),
        consumer.clone(),
        executor.clone(),
        ConnectorConfig::default().with_name("first->second"),
    );
    Fixture {
        producer,
        consumer,
        executor,
        connector,
    }
}

fn texture(id: u32) -> TextureInfo {
    TextureInfo::new(id, id + 100, 1920, 1080)
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_processed_frame_is_released_to_producer() {
    let f = fixture(RecordingConsumer::accepting());

    f.connector.on_input_frame_processed(texture(3)).unwrap();
    assert!(wait_until(|| f.connector.stats().released == 1));
    assert_eq!(f.producer.released.lock().unwrap()[0], texture(3));
    assert!(f.consumer.events().is_empty());

    f.executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

#[test]
fn test_available_frame_is_queued_downstream() {
    let f = fixture(RecordingConsumer::accepting());

    f.connector.on_output_frame_available(texture(1), 100).unwrap();
    assert!(wait_until(|| f.consumer.accepted() == vec![100]));
    assert!(f.producer.released.lock().unwrap().is_empty());

    f.executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

// ============================================================================
// Backpressure
// ============================================================================

#[test]
fn test_rejected_frame_is_retried_before_later_frames() {
    // Reject only the very first offer
    let f = fixture(RecordingConsumer::rejecting_when(|_, attempt| attempt == 0));

    f.connector.on_output_frame_available(texture(1), 100).unwrap();
    f.connector.on_output_frame_available(texture(2), 200).unwrap();

    assert!(wait_until(|| f.consumer.accepted().len() == 2));
    assert!(wait_until(|| f.connector.pending_count() == 0));
    assert_eq!(
        f.consumer.events(),
        vec![
            Event::Offered {
                pts: 100,
                accepted: false
            },
            Event::Offered {
                pts: 100,
                accepted: true
            },
            Event::Offered {
                pts: 200,
                accepted: true
            },
        ]
    );
    let stats = f.connector.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.delivered, 2);

    f.executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

#[test]
fn test_end_of_stream_follows_pending_frames() {
    // Every third offer is rejected
    let f = fixture(RecordingConsumer::rejecting_when(|_, attempt| attempt % 3 == 0));

    for i in 0..10 {
        f.connector
            .on_output_frame_available(texture(i), i as i64 * 33_333)
            .unwrap();
    }
    f.connector.on_current_output_stream_ended().unwrap();

    assert!(wait_until(|| f.consumer.events().last() == Some(&Event::EndOfStream)));
    assert!(wait_until(|| f.connector.pending_count() == 0));
    let accepted = f.consumer.accepted();
    assert_eq!(accepted, (0..10).map(|i| i * 33_333).collect::<Vec<_>>());
    let events = f.consumer.events();
    assert_eq!(
        events.iter().filter(|e| **e == Event::EndOfStream).count(),
        1
    );
    assert_eq!(f.connector.stats().streams_ended, 1);

    f.executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

#[test]
fn test_frames_from_producer_thread_arrive_in_order() {
    let f = fixture(RecordingConsumer::rejecting_when(|_, attempt| attempt % 4 == 1));

    let connector = f.connector.clone();
    let producer = std::thread::spawn(move || {
        for i in 0..100 {
            connector.on_output_frame_available(texture(i), i as i64).unwrap();
        }
        connector.on_current_output_stream_ended().unwrap();
    });
    producer.join().unwrap();

    assert!(wait_until(|| f.consumer.events().last() == Some(&Event::EndOfStream)));
    assert_eq!(f.consumer.accepted(), (0..100).collect::<Vec<i64>>());
    assert!(wait_until(|| f.connector.pending_count() == 0));

    f.executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

#[test]
fn test_one_retry_scheduled_per_rejection() {
    // Reject the first frame twice while more frames pile up behind it
    let f = fixture(RecordingConsumer::rejecting_when(|pts, attempt| {
        pts == 0 && attempt < 2
    }));

    for i in 0..5 {
        f.connector.on_output_frame_available(texture(i), i as i64).unwrap();
    }
    assert!(wait_until(|| f.consumer.accepted().len() == 5));
    assert!(wait_until(|| f.connector.pending_count() == 0));

    // Two rejections, then five accepted offers: no duplicate retries
    assert_eq!(f.consumer.events().len(), 7);
    assert_eq!(f.connector.stats().rejected, 2);
    assert_eq!(f.connector.delivery_state(), DeliveryState::Idle);

    f.executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_release_abandons_retries() {
    let f = fixture(RecordingConsumer::rejecting_when(|_, _| true));

    f.connector.on_output_frame_available(texture(1), 100).unwrap();
    f.connector.on_current_output_stream_ended().unwrap();
    assert!(wait_until(|| f.consumer.attempts.load(Ordering::SeqCst) >= 3));
    assert!(wait_until(
        || f.connector.delivery_state() == DeliveryState::AwaitingRetry
    ));

    let released = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&released);
    f.executor
        .release(
            move || {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            RELEASE_TIMEOUT,
        )
        .unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let attempts = f.consumer.attempts.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(f.consumer.attempts.load(Ordering::SeqCst), attempts);
    assert!(!f.consumer.events().contains(&Event::EndOfStream));

    let err = f.connector.on_current_output_stream_ended().unwrap_err();
    assert!(matches!(err, Error::Executor(_)));
}

#[test]
fn test_consumer_errors_reach_listener() {
    struct FailingConsumer;

    impl FrameConsumer for FailingConsumer {
        fn try_queue_input_frame(&self, _frame: TextureInfo, _pts: i64) -> Result<bool> {
            Err(Error::Stage("input texture pool exhausted".into()))
        }

        fn signal_end_of_current_input_stream(&self) -> Result<()> {
            Ok(())
        }
    }

    init_tracing();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let executor = FrameTaskExecutor::with_error_listener(ExecutorConfig::default(), move |e| {
        sink.lock().unwrap().push(e.to_string());
    })
    .unwrap();
    let connector = StageConnector::new(
        Arc::new(RecordingProducer::default()),
        Arc::new(FailingConsumer),
        executor.clone(),
        ConnectorConfig::default(),
    );

    connector.on_output_frame_available(texture(1), 0).unwrap();
    assert!(wait_until(|| !errors.lock().unwrap().is_empty()));
    assert!(errors.lock().unwrap()[0].contains("input texture pool exhausted"));

    executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}

#[test]
fn test_failed_delivery_is_dropped_and_queue_continues() {
    struct FlakyConsumer {
        calls: AtomicUsize,
        accepted: Mutex<Vec<i64>>,
        ended: AtomicUsize,
    }

    impl FrameConsumer for FlakyConsumer {
        fn try_queue_input_frame(&self, _frame: TextureInfo, pts: i64) -> Result<bool> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::Stage("input surface lost".into()));
            }
            self.accepted.lock().unwrap().push(pts);
            Ok(true)
        }

        fn signal_end_of_current_input_stream(&self) -> Result<()> {
            self.ended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    init_tracing();
    let errors = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&errors);
    let executor = FrameTaskExecutor::with_error_listener(ExecutorConfig::default(), move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let consumer = Arc::new(FlakyConsumer {
        calls: AtomicUsize::new(0),
        accepted: Mutex::new(Vec::new()),
        ended: AtomicUsize::new(0),
    });
    let connector = StageConnector::new(
        Arc::new(RecordingProducer::default()),
        consumer.clone(),
        executor.clone(),
        ConnectorConfig::default(),
    );

    connector.on_output_frame_available(texture(1), 100).unwrap();
    connector.on_current_output_stream_ended().unwrap();

    assert!(wait_until(|| consumer.ended.load(Ordering::SeqCst) == 1));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(consumer.accepted.lock().unwrap().is_empty());
    assert!(wait_until(|| connector.pending_count() == 0));
    assert_eq!(connector.delivery_state(), DeliveryState::Idle);

    // Later frames are delivered normally
    connector.on_output_frame_available(texture(2), 200).unwrap();
    assert!(wait_until(|| *consumer.accepted.lock().unwrap() == vec![200]));
    assert!(wait_until(|| connector.pending_count() == 0));
    let stats = connector.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.streams_ended, 1);

    executor.release(|| Ok(()), RELEASE_TIMEOUT).unwrap();
}
