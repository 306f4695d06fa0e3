// src/storage.rs
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::{Job, JobId, Result, SoloqError};

/// Durable job store consumed by the queue engine.
///
/// All calls are synchronous; a backend may block on I/O internally. The
/// engine never assumes atomicity across calls: compound transitions such
/// as fetch-then-activate are sequenced by the engine itself, so backends
/// only need each individual operation to be consistent.
///
/// FIFO order is by assigned id. `next_pending` must skip the job marked
/// active, and a retried job keeps its id, so it re-enters the queue at
/// its original position rather than the tail.
pub trait Storage: Send + Sync + 'static {
    /// Durably store a new job, assigning its identity. Returns the
    /// stored record with `attempts` at 0.
    fn persist(&self, task: &str, data: serde_json::Value) -> Result<Job>;

    /// Earliest pending job not currently active, or `None`.
    fn next_pending(&self) -> Result<Option<Job>>;

    /// Durably record a retry attempt. A no-op for an unknown id (the job
    /// may have been purged while in flight).
    fn update_attempt_count(&self, id: JobId, attempts: u32) -> Result<()>;

    /// Delete a job. A no-op for an unknown id.
    fn remove(&self, id: JobId) -> Result<()>;

    /// Delete every job, active marker included.
    fn remove_all(&self) -> Result<()>;

    /// Whether any persisted job (active or pending) has this task name.
    fn exists(&self, task: &str) -> Result<bool>;

    /// Mark a job as handed to the worker, excluding it from
    /// `next_pending`.
    fn mark_active(&self, id: JobId) -> Result<()>;

    /// Clear the active marker if it names this id.
    fn clear_active(&self, id: JobId) -> Result<()>;

    /// The job currently marked active, if any.
    fn active_job(&self) -> Result<Option<Job>>;

    /// Pending jobs with this task name, earliest first.
    fn pending_jobs(&self, task: &str) -> Result<Vec<Job>>;
}

#[derive(Default)]
struct MemoryState {
    jobs: Vec<Job>,
    active: Option<JobId>,
    next_id: i64,
}

/// In-process [`Storage`] backend.
///
/// Nothing survives a restart; useful for tests and for queues whose jobs
/// are cheap to regenerate. Jobs are held in enqueue order.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn persist(&self, task: &str, data: serde_json::Value) -> Result<Job> {
        if task.is_empty() {
            return Err(SoloqError::InvalidJob("empty task name".into()));
        }
        let mut state = self.state();
        state.next_id += 1;
        let job = Job {
            id: JobId(state.next_id),
            task: task.to_string(),
            data,
            attempts: 0,
            created_at: Utc::now(),
        };
        state.jobs.push(job.clone());
        Ok(job)
    }

    fn next_pending(&self) -> Result<Option<Job>> {
        let state = self.state();
        let active = state.active;
        Ok(state
            .jobs
            .iter()
            .find(|job| Some(job.id) != active)
            .cloned())
    }

    fn update_attempt_count(&self, id: JobId, attempts: u32) -> Result<()> {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
            job.attempts = attempts;
        }
        Ok(())
    }

    fn remove(&self, id: JobId) -> Result<()> {
        self.state().jobs.retain(|job| job.id != id);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        let mut state = self.state();
        state.jobs.clear();
        state.active = None;
        Ok(())
    }

    fn exists(&self, task: &str) -> Result<bool> {
        Ok(self.state().jobs.iter().any(|job| job.task == task))
    }

    fn mark_active(&self, id: JobId) -> Result<()> {
        self.state().active = Some(id);
        Ok(())
    }

    fn clear_active(&self, id: JobId) -> Result<()> {
        let mut state = self.state();
        if state.active == Some(id) {
            state.active = None;
        }
        Ok(())
    }

    fn active_job(&self) -> Result<Option<Job>> {
        let state = self.state();
        let active = state.active;
        Ok(state.jobs.iter().find(|job| Some(job.id) == active).cloned())
    }

    fn pending_jobs(&self, task: &str) -> Result<Vec<Job>> {
        let state = self.state();
        let active = state.active;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.task == task && Some(job.id) != active)
            .cloned()
            .collect())
    }
}
