// src/worker.rs
use crate::Job;

/// Result of a single job attempt, signaled by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The job is done and is removed from the queue.
    Success,
    /// The attempt failed; the engine consults the retry policy.
    Fail,
    /// Non-retryable failure; the job is dropped immediately, bypassing
    /// the retry policy.
    Critical,
}

/// The external executor the engine hands jobs to.
///
/// `process` is invoked once per attempt and must resolve exactly once;
/// returning the [`Outcome`] is the completion signal, so the
/// one-signal-per-invocation contract is enforced by the type. The engine
/// runs `process` on its own task: a panic does not wedge the queue and
/// is accounted as [`Outcome::Fail`].
///
/// The engine suspends until the returned future resolves, so at most one
/// invocation is ever outstanding. No timeout is imposed; a worker that
/// needs a deadline must enforce it itself and still resolve.
#[async_trait::async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn process(&self, job: Job) -> Outcome;
}
