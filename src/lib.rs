// src/lib.rs
//! soloq: a persistence-backed, single-consumer job queue
//!
//! Callers enqueue named units of work with an opaque JSON payload. A
//! single engine task pulls jobs one at a time in FIFO order, hands each
//! to a [`Worker`], and applies retry-with-limit semantics on failure,
//! broadcasting lifecycle events throughout. Jobs survive process
//! restarts via a pluggable [`Storage`] backend.

pub mod error;
pub mod event;
pub mod job;
pub mod queue;
pub mod retry;
pub mod sqlite;
pub mod storage;
pub mod worker;

pub use error::{Result, SoloqError};
pub use event::{EventEmitter, QueueEvent};
pub use job::{Job, JobId};
pub use queue::{Queue, QueueConfig};
pub use retry::RetryDecision;
pub use sqlite::SqliteStorage;
pub use storage::{MemoryStorage, Storage};
pub use worker::{Outcome, Worker};

// Re-export commonly used types
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
