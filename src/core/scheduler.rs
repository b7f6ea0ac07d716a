//! Single-flight polling loop over every live queue dispatcher.
//!
//! A drain cycle runs on the [`CyclePool`] worker:
//!
//! 1. resolve the service identity (a missing identity fails the cycle);
//! 2. make passes over a snapshot of the registry, one message per dispatcher per pass,
//!    until a pass finds no work. A dispatcher that fails is skipped for the rest of
//!    the cycle only;
//! 3. release the run permit;
//! 4. pause for the poll interval, or the failure interval if the cycle found no
//!    queues, failed or panicked. `poll()` and `destroy()` cut the pause short;
//! 5. reschedule unless shut down or the registry is empty. Adding a tenant schedules
//!    again.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::core::{
    ConfigError, CyclePool, DispatchError, Job, PauseSignal, PermitGuard, PoolError, QueueDispatcher,
    QueueDispatchers, RunPermit, ServiceIdentity, Tenant, WorkerContext,
};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Nothing running or paused.
    Idle,
    /// A drain cycle is executing.
    Running,
    /// Waiting out an interval; interruptible.
    Paused,
}

struct Intervals {
    poll: Duration,
    failure: Duration,
}

struct Shared {
    dispatchers: Arc<QueueDispatchers>,
    pool: CyclePool,
    permit: Arc<RunPermit>,
    pause: PauseSignal,
    intervals: Mutex<Intervals>,
    state: Mutex<SchedulerState>,
    last_pause: Mutex<Option<Duration>>,
    cycles: AtomicU64,
    shutdown: AtomicBool,
}

impl Shared {
    /// Submit a drain cycle if none is in flight. An external request that finds a
    /// cycle in flight leaves a wake signal so that cycle's pause ends immediately.
    fn schedule(self: &Arc<Self>, external: bool) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            debug!("dispatcher shut down, not scheduling");
            return false;
        }
        let Some(guard) = RunPermit::try_guard(&self.permit) else {
            if external {
                self.pause.wake();
            }
            return false;
        };
        let shared = Arc::clone(self);
        let job: Job = Box::new(move |worker: &WorkerContext| {
            shared.dispatch_and_reschedule(worker, guard);
        });
        match self.pool.submit(job) {
            Ok(()) => {
                // The previous cycle may be pausing or about to pause. The submitted
                // cycle clears this signal when it starts.
                self.pause.wake();
                true
            }
            Err(PoolError::PoolShutdown) => false,
            Err(e) => {
                warn!(error = %e, "failed to submit drain cycle");
                false
            }
        }
    }

    fn dispatch_and_reschedule(self: &Arc<Self>, worker: &WorkerContext, guard: PermitGuard) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        self.pause.clear();
        self.set_state(SchedulerState::Running);

        let success = match self.dispatchers.directory().service_identity() {
            Some(identity) => {
                match catch_unwind(AssertUnwindSafe(|| worker.run(self.dispatch_all(&identity)))) {
                    Ok(Some(success)) => success,
                    Ok(None) => {
                        warn!("drain cycle cancelled");
                        false
                    }
                    Err(panic) => {
                        error!(
                            panic = panic_message(panic.as_ref()),
                            "drain cycle panicked, retrying after the failure interval"
                        );
                        false
                    }
                }
            }
            None => {
                error!("no service identity configured, cannot dispatch events");
                false
            }
        };
        self.cycles.fetch_add(1, Ordering::Relaxed);
        drop(guard);

        if self.shutdown.load(Ordering::Acquire) {
            self.set_state(SchedulerState::Idle);
            return;
        }
        let interval = {
            let intervals = self.intervals.lock();
            if success {
                intervals.poll
            } else {
                intervals.failure
            }
        };
        *self.last_pause.lock() = Some(interval);
        self.set_state(SchedulerState::Paused);
        let outcome = self.pause.pause(interval);
        self.set_state(SchedulerState::Idle);
        debug!(?outcome, ?interval, "pause finished");

        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        if self.dispatchers.is_empty() {
            debug!("no queues to poll, waiting for a tenant to be added");
        } else {
            self.schedule(false);
        }
    }

    /// Returns true if at least one dispatcher was available.
    async fn dispatch_all(&self, identity: &ServiceIdentity) -> bool {
        let mut available = false;
        let mut excluded: Vec<Arc<QueueDispatcher>> = Vec::new();
        loop {
            let dispatchers = self.dispatchers.get_dispatchers();
            available |= !dispatchers.is_empty();
            let mut processed = false;
            for dispatcher in dispatchers {
                if self.shutdown.load(Ordering::Acquire) {
                    return available;
                }
                if excluded.iter().any(|d| Arc::ptr_eq(d, &dispatcher)) {
                    continue;
                }
                match dispatcher.dispatch(identity).await {
                    Ok(found) => processed |= found,
                    Err(e) => {
                        error!(
                            tenant = %dispatcher.tenant(),
                            key = %dispatcher.key(),
                            error = %e,
                            "dispatch failed, skipping queue for the rest of this cycle"
                        );
                        excluded.push(dispatcher);
                    }
                }
            }
            if !processed {
                return available;
            }
        }
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock() = state;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Polls every registered queue on a background worker, at most one cycle at a time.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use tenant_dispatch::config::DispatchConfig;
/// use tenant_dispatch::core::{QueueDispatchers, ScheduledDispatcher, Tenant};
///
/// let scheduler = ScheduledDispatcher::new(registry, &DispatchConfig::from_env()?)?;
/// scheduler.tenant_added(&Tenant::new(1, "Main Street"))?;
/// // ...
/// scheduler.destroy();
/// ```
pub struct ScheduledDispatcher {
    shared: Arc<Shared>,
    shutdown_timeout: Duration,
}

impl ScheduledDispatcher {
    /// Start the worker. No cycle runs until [`poll`](Self::poll) or a tenant is added.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or if the worker cannot be started.
    pub fn new(dispatchers: Arc<QueueDispatchers>, config: &DispatchConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = CyclePool::new("queue-dispatch", config.worker_stack_size)?;
        info!(
            poll_interval_ms = config.poll_interval_ms,
            failure_interval_ms = config.failure_interval_ms,
            "scheduled dispatcher started"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                dispatchers,
                pool,
                permit: Arc::new(RunPermit::new()),
                pause: PauseSignal::new(),
                intervals: Mutex::new(Intervals {
                    poll: config.poll_interval(),
                    failure: config.failure_interval(),
                }),
                state: Mutex::new(SchedulerState::Idle),
                last_pause: Mutex::new(None),
                cycles: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Submit a drain cycle unless one is already in flight. Never blocks.
    ///
    /// Returns true if a cycle was submitted. When one is already in flight, its
    /// next pause is cut short instead, so repeated calls yield at most one extra cycle.
    pub fn schedule(&self) -> bool {
        self.shared.schedule(true)
    }

    /// On-demand wake-up; same as [`schedule`](Self::schedule).
    pub fn poll(&self) -> bool {
        self.schedule()
    }

    /// Register a new or updated tenant and poll straight away if it brought a new queue.
    ///
    /// # Errors
    ///
    /// Propagates dispatcher construction failures from the registry.
    pub fn tenant_added(&self, tenant: &Tenant) -> Result<bool, DispatchError> {
        let created = self.shared.dispatchers.add(tenant)?;
        Ok(created.is_some() && self.schedule())
    }

    /// Unregister a tenant, polling if another tenant was promoted onto its queue.
    pub fn tenant_removed(&self, tenant: &Tenant) {
        if self.shared.dispatchers.remove(tenant).is_some() {
            self.schedule();
        }
    }

    /// The registry being polled.
    #[must_use]
    pub fn dispatchers(&self) -> &Arc<QueueDispatchers> {
        &self.shared.dispatchers
    }

    /// Change the pause after successful cycles. Takes effect on the next pause and
    /// ends a pause in progress.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] for a zero duration.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<(), ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::NonPositive("poll interval"));
        }
        self.shared.intervals.lock().poll = interval;
        self.shared.pause.wake_if_pausing();
        Ok(())
    }

    /// Change the pause after empty or failed cycles. Takes effect on the next pause
    /// and ends a pause in progress.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] for a zero duration.
    pub fn set_failure_interval(&self, interval: Duration) -> Result<(), ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::NonPositive("failure interval"));
        }
        self.shared.intervals.lock().failure = interval;
        self.shared.pause.wake_if_pausing();
        Ok(())
    }

    /// Pause after successful cycles.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.shared.intervals.lock().poll
    }

    /// Pause after empty or failed cycles.
    #[must_use]
    pub fn failure_interval(&self) -> Duration {
        self.shared.intervals.lock().failure
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }

    /// Number of drain cycles completed.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Interval chosen for the most recent pause.
    #[must_use]
    pub fn last_pause(&self) -> Option<Duration> {
        *self.shared.last_pause.lock()
    }

    /// True once [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Shut down: end any pause, wait up to the shutdown timeout for an in-flight cycle,
    /// then stop the worker, cancelling it if it overruns the timeout again.
    ///
    /// Returns true if the worker exited cleanly. Idempotent; no cycle runs afterwards.
    pub fn destroy(&self) -> bool {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }
        info!("shutting down scheduled dispatcher");
        self.shared.pause.shutdown();
        // Held for good: nothing may start once shut down.
        if !self.shared.permit.acquire_timeout(self.shutdown_timeout) {
            warn!(
                timeout_ms = u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
                "drain cycle still running after shutdown timeout"
            );
        }
        let clean = self.shared.pool.shutdown(self.shutdown_timeout);
        self.shared.set_state(SchedulerState::Idle);
        info!(clean, "scheduled dispatcher shut down");
        clean
    }
}

impl Drop for ScheduledDispatcher {
    fn drop(&mut self) {
        // Don't wait in Drop; destroy() is required for a bounded, graceful stop.
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            self.shared.pause.shutdown();
            self.shared.pool.close();
            debug!("ScheduledDispatcher dropped without destroy - worker will be detached");
        }
    }
}
