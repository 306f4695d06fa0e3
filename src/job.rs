// src/job.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a job, assigned by the storage backend.
///
/// Ids are monotonically increasing within a backend, so they double as
/// the FIFO ordering key: a retried job keeps its id and therefore its
/// original queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted unit of work.
///
/// `task` names the kind of work and `data` is an opaque payload handed
/// unmodified to the worker. Both are immutable after enqueue; only
/// `attempts` changes over a job's life. Jobs are constructed by
/// [`Storage::persist`](crate::Storage::persist), never by callers, so
/// identity and attempt accounting stay owned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task: String,
    pub data: serde_json::Value,
    /// Number of failed attempts so far. Starts at 0.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}
