//! Single-threaded task executor.
//!
//! All tasks submitted to one [`FrameTaskExecutor`] run in submission order
//! on one named worker thread, so state touched only from tasks needs no
//! further synchronization against itself. Delayed tasks are kept in a timer
//! heap on the worker and run once due, without a thread per timer.

use crate::error::{Error, Result};
use crate::observability;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() -> Result<()> + Send>;
type ErrorListener = Box<dyn Fn(&Error) + Send>;

/// Configuration for a [`FrameTaskExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Worker thread name.
    pub name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "segue-frame-executor".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Set the worker thread name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

enum Command {
    Run(Task),
    RunAt(Instant, Task),
    Release(Task),
}

struct Delayed {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

struct Inner {
    name: String,
    tx: kanal::Sender<Command>,
    finished_rx: kanal::Receiver<Result<()>>,
    cancelled: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Runs tasks one at a time on a dedicated worker thread.
///
/// Cloning yields another handle to the same worker. Failed tasks are
/// logged and passed to the error listener; they never stop the worker.
///
/// # Example
///
/// ```rust,ignore
/// let executor = FrameTaskExecutor::new(ExecutorConfig::default())?;
/// executor.submit(|| {
///     tracing::info!("running on the worker");
///     Ok(())
/// })?;
/// executor.release(|| Ok(()), Duration::from_millis(500))?;
/// ```
#[derive(Clone)]
pub struct FrameTaskExecutor {
    inner: Arc<Inner>,
}

impl FrameTaskExecutor {
    /// Start a worker that logs task failures.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        Self::with_error_listener(config, |_| {})
    }

    /// Start a worker that also reports task failures to `listener`.
    pub fn with_error_listener(
        config: ExecutorConfig,
        listener: impl Fn(&Error) + Send + 'static,
    ) -> Result<Self> {
        let (tx, rx) = kanal::unbounded();
        let (finished_tx, finished_rx) = kanal::bounded(1);

        let cancelled = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            name: config.name.clone(),
            cancelled: Arc::clone(&cancelled),
            listener: Box::new(listener),
        };
        let thread = std::thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker.run(rx, finished_tx))
            .map_err(|e| Error::Executor(format!("failed to spawn {}: {}", config.name, e)))?;

        tracing::debug!("{}: worker started", config.name);

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name,
                tx,
                finished_rx,
                cancelled,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Worker name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns true once [`release`](Self::release) was called.
    pub fn is_released(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Queue `task` to run after every task submitted before it.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.send(Command::Run(Box::new(task)))
    }

    /// Queue `task` to run once `delay` has elapsed.
    pub fn submit_after<F>(&self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.send(Command::RunAt(Instant::now() + delay, Box::new(task)))
    }

    /// Stop the worker.
    ///
    /// Tasks still queued or scheduled are discarded, `release_task` runs on
    /// the worker as its last task, and the call waits at most `timeout` for
    /// it to finish. Returns the release task's result.
    ///
    /// Must not be called from a task, which would wait on itself.
    pub fn release<F>(&self, release_task: F, timeout: Duration) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return Err(Error::Executor(format!(
                "{}: already released",
                self.inner.name
            )));
        }
        self.inner
            .tx
            .send(Command::Release(Box::new(release_task)))
            .map_err(|_| Error::Executor(format!("{}: worker has exited", self.inner.name)))?;

        let result = self
            .inner
            .finished_rx
            .recv_timeout(timeout)
            .map_err(|_| Error::Timeout(timeout))?;

        let thread = self
            .inner
            .thread
            .lock()
            .map_err(|_| Error::Executor(format!("{}: thread lock poisoned", self.inner.name)))?
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::warn!("{}: worker panicked during release", self.inner.name);
            }
        }
        tracing::debug!("{}: released", self.inner.name);
        result
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.is_released() {
            return Err(Error::Executor(format!("{}: released", self.inner.name)));
        }
        self.inner
            .tx
            .send(command)
            .map_err(|_| Error::Executor(format!("{}: worker has exited", self.inner.name)))
    }
}

impl std::fmt::Debug for FrameTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTaskExecutor")
            .field("name", &self.inner.name)
            .field("released", &self.is_released())
            .finish()
    }
}

struct Worker {
    name: String,
    cancelled: Arc<AtomicBool>,
    listener: ErrorListener,
}

impl Worker {
    fn run(self, rx: kanal::Receiver<Command>, finished_tx: kanal::Sender<Result<()>>) {
        let mut timers: BinaryHeap<Reverse<Delayed>> = BinaryHeap::new();
        let mut seq = 0u64;

        loop {
            let now = Instant::now();
            while timers
                .peek()
                .is_some_and(|Reverse(next)| next.deadline <= now)
            {
                if let Some(Reverse(due)) = timers.pop() {
                    self.run_task(due.task);
                }
            }

            let received = match timers.peek() {
                Some(Reverse(next)) => {
                    let wait = next.deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(wait).map_err(|_| rx.is_disconnected())
                }
                None => rx.recv().map_err(|_| true),
            };
            let command = match received {
                Ok(command) => command,
                // Timer due
                Err(false) => continue,
                // Every handle dropped
                Err(true) => break,
            };

            match command {
                Command::Run(task) => self.run_task(task),
                Command::RunAt(deadline, task) => {
                    timers.push(Reverse(Delayed {
                        deadline,
                        seq,
                        task,
                    }));
                    seq += 1;
                }
                Command::Release(task) => {
                    let discarded = timers.len() + rx.len();
                    timers.clear();
                    while let Ok(Some(_)) = rx.try_recv() {}
                    if discarded > 0 {
                        tracing::debug!("{}: discarded {} queued tasks", self.name, discarded);
                    }
                    let result = task();
                    if let Err(e) = &result {
                        observability::trace_error(&self.name, e);
                    }
                    let _ = finished_tx.try_send(result);
                    return;
                }
            }
        }

        tracing::debug!("{}: all handles dropped, worker exiting", self.name);
    }

    fn run_task(&self, task: Task) {
        if self.cancelled.load(Ordering::Acquire) {
            // Dropped unrun once release was requested
            return;
        }
        if let Err(e) = task() {
            observability::trace_error(&self.name, &e);
            (self.listener)(&e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

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

    #[test]
    fn test_tasks_run_in_order() {
        let executor = FrameTaskExecutor::new(ExecutorConfig::default()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = Arc::clone(&log);
            executor
                .submit(move || {
                    log.lock().unwrap().push(i);
                    Ok(())
                })
                .unwrap();
        }
        assert!(wait_until(|| log.lock().unwrap().len() == 10));
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
        executor.release(|| Ok(()), Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_delayed_task_runs_after_delay() {
        let executor = FrameTaskExecutor::new(ExecutorConfig::default()).unwrap();
        let ran_at = Arc::new(Mutex::new(None));
        let start = Instant::now();
        {
            let ran_at = Arc::clone(&ran_at);
            executor
                .submit_after(Duration::from_millis(20), move || {
                    *ran_at.lock().unwrap() = Some(Instant::now());
                    Ok(())
                })
                .unwrap();
        }
        assert!(wait_until(|| ran_at.lock().unwrap().is_some()));
        let ran_at = ran_at.lock().unwrap().unwrap();
        assert!(ran_at.duration_since(start) >= Duration::from_millis(20));
        executor.release(|| Ok(()), Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_errors_reach_listener() {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&failures);
        let executor = FrameTaskExecutor::with_error_listener(ExecutorConfig::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        executor
            .submit(|| Err(Error::Stage("shader failed".into())))
            .unwrap();
        let after = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&after);
        executor
            .submit(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(wait_until(|| after.load(Ordering::SeqCst)));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        executor.release(|| Ok(()), Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_release_discards_scheduled_tasks() {
        let executor = FrameTaskExecutor::new(ExecutorConfig::default()).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor
            .submit_after(Duration::from_millis(50), move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        executor.release(|| Ok(()), Duration::from_secs(1)).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(executor.is_released());
        assert!(matches!(executor.submit(|| Ok(())), Err(Error::Executor(_))));
        assert!(executor.release(|| Ok(()), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_release_returns_task_result() {
        let executor = FrameTaskExecutor::new(ExecutorConfig::default()).unwrap();
        let err = executor
            .release(|| Err(Error::Stage("cleanup".into())), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::Stage(_)));
    }

    #[test]
    fn test_release_times_out_on_blocked_worker() {
        let executor = FrameTaskExecutor::new(ExecutorConfig::default()).unwrap();
        executor
            .submit(|| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .unwrap();
        // Let the worker pick up the blocking task
        std::thread::sleep(Duration::from_millis(20));

        let err = executor
            .release(|| Ok(()), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
