//! Executor abstraction with a worker thread pool
//!
//! The future type never runs user code on a thread of its own choosing:
//! asynchronous execution always goes through an injected [`Executor`].
//! This module provides the trait plus two implementations: a
//! [`ThreadPool`] backed by worker threads draining a shared channel, and
//! a [`DirectExecutor`] that runs jobs inline for deterministic,
//! single-threaded use.
//!
//! ## Panic Handling
//!
//! Pool workers wrap every job in `std::panic::catch_unwind`, so a
//! panicking job is logged and discarded while the worker keeps draining
//! the queue. Jobs submitted through `CompletableFuture::supply_async`
//! additionally convert the panic into a failed future before it reaches
//! the worker loop.

use std::fmt;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// A unit of work submitted to an executor
pub type Job = Box<dyn FnOnce() + Send>;

/// An abstraction that runs a unit of work, decoupled from the caller's
/// thread
///
/// Implementations must return from [`execute`](Executor::execute)
/// immediately; the job runs later (or, for [`DirectExecutor`], inline).
pub trait Executor: Send + Sync {
    /// Submit a job for execution
    fn execute(&self, job: Job);
}

/// Runs every job inline on the calling thread
///
/// Useful for deterministic tests and for callers that explicitly want
/// completion-thread execution through an executor-shaped dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

enum WorkerMessage {
    Run(Job),
    Shutdown,
}

/// A fixed-size pool of worker threads draining a shared job queue
///
/// Dropping the pool sends a shutdown message per worker and joins them;
/// jobs already queued ahead of the shutdown messages still run.
pub struct ThreadPool {
    sender: Sender<WorkerMessage>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPool {
    /// Create a pool with the given number of worker threads
    /// (at least one)
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = unbounded();

        let workers = (0..threads)
            .map(|id| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("completable-worker-{}", id))
                    .spawn(move || worker_loop(id, receiver))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { sender, workers }
    }

    /// Create a pool with one worker per available CPU
    pub fn with_default_parallelism() -> Self {
        Self::new(num_cpus::get())
    }

    /// Number of worker threads in this pool
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::with_default_parallelism()
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) {
        if self.sender.send(WorkerMessage::Run(job)).is_err() {
            tracing::warn!("job submitted to a thread pool that is shutting down");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Each worker consumes exactly one shutdown message and exits
        for _ in &self.workers {
            let _ = self.sender.send(WorkerMessage::Shutdown);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn worker_loop(id: usize, receiver: Receiver<WorkerMessage>) {
    tracing::debug!("worker {} started", id);

    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Run(job) => {
                // Isolate panicking jobs from the worker loop
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                    tracing::error!("worker {} caught a panicking job", id);
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }

    tracing::debug!("worker {} shutting down", id);
}
