use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::pipeline::{IngestOutcome, Pipeline, PipelineError};
use crate::sanitize;
use crate::worker::task::{panic_message, Task};

/// How [`TaskSink::submit`] behaves when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Fail with `QueueFull` immediately.
    NonBlocking,
    /// Wait for space, up to the given timeout or forever.
    Blocking(Option<Duration>),
}

/// Anything that accepts tasks for asynchronous execution.
pub trait TaskSink: Send + Sync {
    fn submit(&self, task: Task, mode: SubmitMode) -> Result<(), WorkerError>;
}

enum QueueItem {
    Task(Box<Task>),
    Shutdown,
}

/// Fixed set of worker threads draining a bounded FIFO of tasks.
pub struct WorkerPool {
    sender: Sender<QueueItem>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    capacity: usize,
    shutdown: AtomicBool,
    /// Submitters hold it shared across check-and-send, shutdown holds it
    /// exclusively, so no task is ever queued behind the sentinels.
    gate: RwLock<()>,
}

impl WorkerPool {
    /// Starts `worker_count` threads sharing `pipeline`, fed by a queue that
    /// holds at most `capacity` pending tasks.
    pub fn new(
        pipeline: Arc<Pipeline>,
        worker_count: usize,
        capacity: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 || capacity == 0 {
            warn!(
                "Worker pool needs at least one worker and one queue slot (got {}/{}), using 1",
                worker_count, capacity
            );
        }
        let worker_count = worker_count.max(1);
        let capacity = capacity.max(1);

        let (sender, receiver) = bounded::<QueueItem>(capacity);
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let rx = receiver.clone();
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("pdf-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, rx, worker_pipeline))
                .map_err(WorkerError::SpawnFailed)?;

            workers.push(handle);
        }

        info!(
            "Started {} workers (queue capacity {})",
            worker_count, capacity
        );

        Ok(Self {
            sender,
            workers: Mutex::new(workers),
            worker_count,
            capacity,
            shutdown: AtomicBool::new(false),
            gate: RwLock::new(()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks waiting in the queue, not counting ones already claimed.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting tasks and sends one shutdown sentinel per worker.
    ///
    /// Tasks already queued ahead of the sentinels still run, and so do
    /// blocking submissions still waiting for space. With `wait`, blocks
    /// until every worker thread has exited.
    pub fn shutdown(&self, wait: bool) {
        {
            let _gate = self.gate_exclusive();
            if self.shutdown.swap(true, Ordering::AcqRel) {
                debug!("Worker pool already shut down");
            } else {
                info!("Shutting down worker pool...");
                for _ in 0..self.worker_count {
                    if self.sender.send(QueueItem::Shutdown).is_err() {
                        break;
                    }
                }
            }
        }

        if wait {
            let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
                Ok(mut guard) => guard.drain(..).collect(),
                Err(poisoned) => {
                    warn!("Worker handle lock was poisoned, recovering");
                    poisoned.into_inner().drain(..).collect()
                }
            };
            for (i, worker) in handles.into_iter().enumerate() {
                if let Err(e) = worker.join() {
                    error!("Worker {} panicked: {:?}", i, e);
                } else {
                    debug!("Worker {} finished", i);
                }
            }
            info!("All workers have stopped");
        }
    }

    fn gate_shared(&self) -> RwLockReadGuard<'_, ()> {
        match self.gate.read() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Submit gate was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn gate_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        match self.gate.write() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Submit gate was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl TaskSink for WorkerPool {
    fn submit(&self, task: Task, mode: SubmitMode) -> Result<(), WorkerError> {
        let _gate = self.gate_shared();
        if self.is_shutdown() {
            return Err(WorkerError::ShutDown);
        }

        let item = QueueItem::Task(Box::new(task));
        match mode {
            SubmitMode::NonBlocking => self.sender.try_send(item).map_err(|e| match e {
                TrySendError::Full(_) => WorkerError::QueueFull,
                TrySendError::Disconnected(_) => WorkerError::ShutDown,
            }),
            SubmitMode::Blocking(Some(timeout)) => {
                self.sender.send_timeout(item, timeout).map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => WorkerError::QueueFull,
                    SendTimeoutError::Disconnected(_) => WorkerError::ShutDown,
                })
            }
            SubmitMode::Blocking(None) => {
                self.sender.send(item).map_err(|_| WorkerError::ShutDown)
            }
        }
    }
}

/// Runs one task with start, success and error notifications.
///
/// A panic inside the pipeline becomes [`PipelineError::Panicked`] and is
/// reported like any other failure.
pub fn run_task(pipeline: &Pipeline, task: &Task) -> Result<IngestOutcome, PipelineError> {
    task.notify_start();

    let result = catch_unwind(AssertUnwindSafe(|| pipeline.execute(task))).unwrap_or_else(
        |panic| Err(PipelineError::Panicked(panic_message(panic.as_ref()))),
    );

    match &result {
        Ok(outcome) => task.notify_success(outcome),
        Err(e) => {
            error!(
                "Task {} failed for {}: {}",
                task.id,
                sanitize::redact_path(&task.source_path),
                e
            );
            task.notify_error(e);
        }
    }
    result
}

fn run_worker(worker_id: usize, receiver: Receiver<QueueItem>, pipeline: Arc<Pipeline>) {
    debug!("Worker {} started", worker_id);

    loop {
        match receiver.recv() {
            Ok(QueueItem::Task(task)) => {
                debug!("Worker {} processing task {}", worker_id, task.id);
                let _ = run_task(&pipeline, &task);
            }
            Ok(QueueItem::Shutdown) => {
                debug!("Worker {} received shutdown signal", worker_id);
                break;
            }
            Err(_) => {
                debug!("Worker {} queue disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
