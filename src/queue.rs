// src/queue.rs
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex, PoisonError,
};

use tokio::{
    sync::{broadcast, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    event::{EventEmitter, QueueEvent},
    retry::{self, RetryDecision},
    worker::Outcome,
    Job, Result, SoloqError, Storage, Worker,
};

/// Queue engine configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum attempts per job before a failure is terminal. A job gets
    /// at most `retry_limit` attempts total. May be changed at runtime
    /// with [`Queue::set_retry_limit`].
    pub retry_limit: u32,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_limit: 4,
            event_capacity: 64,
        }
    }
}

/// Single-consumer job queue engine.
///
/// Owns the run/stop lifecycle and a processing loop that pulls jobs from
/// the [`Storage`] backend in FIFO order and hands them to the [`Worker`],
/// one at a time. The loop is a single spawned task and is the only code
/// that fetches or activates jobs, so two jobs can never be in flight at
/// once no matter how many threads call [`enqueue`](Queue::enqueue),
/// [`start`](Queue::start), or [`stop`](Queue::stop) concurrently.
///
/// Dropping the queue aborts the loop; an in-flight worker invocation
/// keeps running detached but its outcome is discarded.
pub struct Queue {
    inner: Arc<Inner>,
    loop_handle: JoinHandle<()>,
}

struct Inner {
    storage: Arc<dyn Storage>,
    worker: Arc<dyn Worker>,
    emitter: EventEmitter,
    running: AtomicBool,
    retry_limit: AtomicU32,
    active: Mutex<Option<Job>>,
    wake: Notify,
}

impl Queue {
    /// Create the engine and spawn its processing loop. The queue starts
    /// stopped; call [`start`](Queue::start) to begin pulling jobs.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(storage: Arc<dyn Storage>, worker: Arc<dyn Worker>, config: QueueConfig) -> Self {
        let inner = Arc::new(Inner {
            storage,
            worker,
            emitter: EventEmitter::new(config.event_capacity),
            running: AtomicBool::new(false),
            retry_limit: AtomicU32::new(config.retry_limit),
            active: Mutex::new(None),
            wake: Notify::new(),
        });

        let loop_handle = tokio::spawn(run_loop(Arc::clone(&inner)));

        Self { inner, loop_handle }
    }

    /// Persist a new job. Rejects an empty task name regardless of
    /// backend. Processing does not begin until the queue is running; an
    /// idle running loop is woken immediately.
    pub fn enqueue(&self, task: &str, data: serde_json::Value) -> Result<Job> {
        if task.is_empty() {
            return Err(SoloqError::InvalidJob("empty task name".into()));
        }
        let job = self.inner.storage.persist(task, data)?;
        debug!(job_id = %job.id, task = %job.task, "job enqueued");
        self.inner.wake.notify_one();
        Ok(job)
    }

    /// Allow the loop to pull jobs. Emits [`QueueEvent::Started`] on the
    /// transition from stopped to running; calling while already running
    /// is a no-op.
    pub fn start(&self) {
        if !self.inner.running.swap(true, Ordering::AcqRel) {
            info!("queue started");
            self.inner.emitter.emit(QueueEvent::Started);
            self.inner.wake.notify_one();
        }
    }

    /// Stop pulling jobs after the current one (if any) completes. Does
    /// not cancel an in-flight job. Emits [`QueueEvent::Stopped`] on the
    /// transition; calling while already stopped is a no-op.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            info!("queue stopped");
            self.inner.emitter.emit(QueueEvent::Stopped);
        }
    }

    /// Unconditionally remove every persisted job, started or not. An
    /// in-flight job is not interrupted; its terminal storage update
    /// becomes a no-op. Safe to call whether running or stopped.
    pub fn empty(&self) -> Result<()> {
        self.inner.storage.remove_all()?;
        info!("queue emptied");
        Ok(())
    }

    /// Whether the loop is permitted to pull new jobs.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Whether a job is currently in flight.
    pub fn is_active(&self) -> bool {
        self.inner.active_snapshot().is_some()
    }

    /// Whether any persisted job (active or pending) has this task name.
    pub fn job_exists_for_task(&self, task: &str) -> Result<bool> {
        self.inner.storage.exists(task)
    }

    /// Whether the currently in-flight job (if any) has this task name.
    pub fn job_is_active_for_task(&self, task: &str) -> bool {
        self.inner
            .active_snapshot()
            .is_some_and(|job| job.task == task)
    }

    /// Earliest-enqueued pending job with this task name, if any.
    pub fn next_job_for_task(&self, task: &str) -> Result<Option<Job>> {
        Ok(self.inner.storage.pending_jobs(task)?.into_iter().next())
    }

    pub fn retry_limit(&self) -> u32 {
        self.inner.retry_limit.load(Ordering::Relaxed)
    }

    /// Change the retry limit. Takes effect on the next failure; the
    /// policy is reevaluated per failure, never cached.
    pub fn set_retry_limit(&self, limit: u32) {
        self.inner.retry_limit.store(limit, Ordering::Relaxed);
    }

    /// Subscribe to lifecycle events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.emitter.subscribe()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}

/// The engine's control loop. Sole owner of fetch/activate transitions.
///
/// Suspends in exactly two places: waiting for a wakeup while idle, and
/// waiting for the worker's outcome while a job is in flight. A storage
/// failure halts the loop (running flips to false) until `start()` is
/// re-issued, rather than spinning against a broken backend.
async fn run_loop(inner: Arc<Inner>) {
    // Set once `Drained` has been emitted for the current empty period,
    // so wakeups that find nothing new do not re-emit it.
    let mut drained = false;

    loop {
        if !inner.running.load(Ordering::Acquire) {
            inner.wake.notified().await;
            continue;
        }

        match inner.storage.next_pending() {
            Ok(Some(job)) => {
                drained = false;
                if let Err(err) = inner.process(job).await {
                    inner.halt_on_storage_error(err);
                }
            }
            Ok(None) => {
                if !drained {
                    drained = true;
                    debug!("queue drained");
                    inner.emitter.emit(QueueEvent::Drained);
                }
                inner.wake.notified().await;
            }
            Err(err) => inner.halt_on_storage_error(err),
        }
    }
}

impl Inner {
    fn active_snapshot(&self) -> Option<Job> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_active(&self, job: Option<Job>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = job;
    }

    /// Run one job through the worker and settle the result. Storage
    /// errors bubble up; the in-memory active snapshot is always cleared.
    async fn process(&self, job: Job) -> Result<()> {
        self.storage.mark_active(job.id)?;
        self.set_active(Some(job.clone()));

        let outcome = self.invoke_worker(job.clone()).await;
        let settled = self.settle(&job, outcome);

        self.set_active(None);
        let cleared = self.storage.clear_active(job.id);
        settled?;
        cleared
    }

    /// Invoke the worker on its own task so a panic cannot wedge the
    /// loop. The returned future resolving is the completion signal, so
    /// exactly one outcome arrives per invocation.
    async fn invoke_worker(&self, job: Job) -> Outcome {
        let worker = Arc::clone(&self.worker);
        let handle = tokio::spawn(async move { worker.process(job).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("worker panicked, counting as failure: {err}");
                Outcome::Fail
            }
        }
    }

    fn settle(&self, job: &Job, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Success => {
                self.storage.remove(job.id)?;
                info!(job_id = %job.id, task = %job.task, "job succeeded");
                self.emitter.emit(QueueEvent::JobSucceeded {
                    task: job.task.clone(),
                    data: job.data.clone(),
                });
            }
            Outcome::Fail => {
                let attempts = job.attempts + 1;
                let limit = self.retry_limit.load(Ordering::Relaxed);
                match retry::decide(attempts, limit) {
                    RetryDecision::Retry => {
                        self.storage.update_attempt_count(job.id, attempts)?;
                        warn!(
                            job_id = %job.id, task = %job.task, attempts,
                            "job failed, will retry"
                        );
                        self.emit_failed(job, false);
                    }
                    RetryDecision::CriticalFailure => {
                        self.storage.remove(job.id)?;
                        error!(
                            job_id = %job.id, task = %job.task, attempts,
                            "job failed, retry limit reached"
                        );
                        self.emit_failed(job, true);
                    }
                }
            }
            Outcome::Critical => {
                self.storage.remove(job.id)?;
                error!(job_id = %job.id, task = %job.task, "job failed critically");
                self.emit_failed(job, true);
            }
        }
        Ok(())
    }

    fn emit_failed(&self, job: &Job, critical: bool) {
        self.emitter.emit(QueueEvent::JobFailed {
            task: job.task.clone(),
            data: job.data.clone(),
            critical,
        });
    }

    /// Storage failures are surfaced as their own event, distinct from
    /// job-level failure, and halt the loop until `start()` is re-issued.
    fn halt_on_storage_error(&self, err: SoloqError) {
        error!("storage failure, halting queue: {err}");
        self.running.store(false, Ordering::Release);
        self.emitter.emit(QueueEvent::StorageFailed {
            error: err.to_string(),
        });
    }
}
