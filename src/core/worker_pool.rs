//! Single-slot worker running drain cycles off the caller's thread.
//!
//! The worker is a dedicated OS thread with its own current-thread tokio runtime, so
//! async queue and dispatcher calls never borrow the embedder's runtime and the pause
//! between cycles can block the thread on a condition variable.
//!
//! # Design Principles
//!
//! - **No polling**: the worker blocks on channel recv
//! - **Clean shutdown**: dropping the sender unblocks the worker naturally
//! - **Two-phase termination**: join within a grace period, then cancel the in-flight
//!   cycle at its next await point and join again

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Errors that can occur when using a [`CyclePool`].
#[derive(Debug)]
pub enum PoolError {
    /// A job is already queued.
    QueueFull,
    /// The pool has been shut down.
    PoolShutdown,
    /// Internal error (thread spawn failure, runtime construction, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "cycle queue is full"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilisation.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Jobs accepted.
    pub submitted: u64,
    /// Jobs run to completion.
    pub completed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Handed to each job; runs futures on the worker's runtime.
pub struct WorkerContext {
    runtime: tokio::runtime::Runtime,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerContext {
    /// Run `fut` to completion on the worker runtime. Returns `None` if the pool was
    /// force-terminated before or while it ran.
    pub fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.cancelled.load(Ordering::Acquire) {
            return None;
        }
        let cancel = Arc::clone(&self.cancel);
        self.runtime.block_on(async move {
            tokio::select! {
                biased;
                () = cancel.notified() => None,
                out = fut => Some(out),
            }
        })
    }
}

/// A unit of work for the worker.
pub type Job = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

/// Pool with exactly one worker thread and room for one queued job.
pub struct CyclePool {
    name: String,
    job_tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    shutdown: AtomicBool,
}

impl CyclePool {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Internal`] if the thread cannot be spawned.
    pub fn new(name: impl Into<String>, stack_size: usize) -> Result<Self, PoolError> {
        let name = name.into();
        let (job_tx, job_rx) = bounded::<Job>(1);
        let counters = Arc::new(PoolCounters::default());
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker = spawn_worker(
            &name,
            stack_size,
            job_rx,
            Arc::clone(&counters),
            Arc::clone(&cancel),
            Arc::clone(&cancelled),
        )?;
        info!(pool = %name, "cycle worker started");

        Ok(Self {
            name,
            job_tx: Mutex::new(Some(job_tx)),
            worker: Mutex::new(Some(worker)),
            counters,
            cancel,
            cancelled,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Queue a job without blocking.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if a job is already waiting
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    pub fn submit(&self, job: Job) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        let job_tx = self.job_tx.lock();
        let Some(job_tx) = job_tx.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };
        match job_tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(crossbeam_channel::TrySendError::Full(_)) => Err(PoolError::QueueFull),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => Err(PoolError::PoolShutdown),
        }
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs and drop any queued one, without waiting for the worker.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.job_tx.lock().take();
    }

    /// Shut down in two phases: wait up to `grace` for the worker to finish its current
    /// job, then cancel that job and wait up to `grace` again. A worker still running
    /// after that is detached.
    ///
    /// Returns true if the worker exited. Idempotent.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.close();
        let Some(worker) = self.worker.lock().take() else {
            return true;
        };
        info!(pool = %self.name, "shutting down cycle worker");

        let (tx, rx) = std::sync::mpsc::channel();
        let joiner = thread::spawn(move || {
            let _ = tx.send(worker.join().is_ok());
        });

        let exited = match rx.recv_timeout(grace) {
            Ok(clean) => Some(clean),
            Err(_) => {
                warn!(pool = %self.name, "worker did not finish within grace period - cancelling");
                self.cancelled.store(true, Ordering::Release);
                self.cancel.notify_one();
                rx.recv_timeout(grace).ok()
            }
        };

        match exited {
            Some(true) => {
                let _ = joiner.join();
                info!(pool = %self.name, "cycle worker shut down");
                true
            }
            Some(false) => {
                let _ = joiner.join();
                warn!(pool = %self.name, "cycle worker panicked");
                true
            }
            None => {
                // The joiner is detached along with the worker.
                warn!(pool = %self.name, "worker did not exit after cancellation - detaching");
                false
            }
        }
    }
}

impl Drop for CyclePool {
    fn drop(&mut self) {
        // Don't join here; explicit shutdown() is required for graceful cleanup.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.job_tx.lock().take();
            debug!(pool = %self.name, "CyclePool dropped without explicit shutdown - worker will be detached");
        }
    }
}

fn spawn_worker(
    name: &str,
    stack_size: usize,
    job_rx: Receiver<Job>,
    counters: Arc<PoolCounters>,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, PoolError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PoolError::Internal(format!("failed to create worker runtime: {e}")))?;
    let pool = name.to_string();

    thread::Builder::new()
        .name(format!("{name}-worker"))
        .stack_size(stack_size)
        .spawn(move || {
            let ctx = WorkerContext {
                runtime,
                cancel,
                cancelled,
            };
            debug!(pool = %pool, "worker thread started");

            // When the sender is dropped, recv returns Err and the worker exits.
            while let Ok(job) = job_rx.recv() {
                if ctx.cancelled.load(Ordering::Acquire) {
                    break;
                }
                if catch_unwind(AssertUnwindSafe(|| job(&ctx))).is_err() {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(pool = %pool, "cycle panicked");
                } else {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
            }

            debug!(pool = %pool, "worker thread exiting");
        })
        .map_err(|e| PoolError::Internal(format!("failed to spawn worker thread: {e}")))
}
