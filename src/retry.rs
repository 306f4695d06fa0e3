// src/retry.rs

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave the job in the queue for another attempt.
    Retry,
    /// Drop the job permanently; the retry budget is exhausted.
    CriticalFailure,
}

/// Decide whether a job that has now failed `attempt_count` times gets
/// another attempt under `retry_limit`.
///
/// A job gets at most `retry_limit` attempts total: the failure that makes
/// `attempt_count == retry_limit` is the critical one. With a limit of 0
/// every failure is critical. Called fresh on every failure since the
/// limit may change at runtime.
pub fn decide(attempt_count: u32, retry_limit: u32) -> RetryDecision {
    if attempt_count < retry_limit {
        RetryDecision::Retry
    } else {
        RetryDecision::CriticalFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_below_the_limit() {
        assert_eq!(decide(1, 4), RetryDecision::Retry);
        assert_eq!(decide(3, 4), RetryDecision::Retry);
    }

    #[test]
    fn critical_at_and_above_the_limit() {
        assert_eq!(decide(4, 4), RetryDecision::CriticalFailure);
        assert_eq!(decide(5, 4), RetryDecision::CriticalFailure);
    }

    #[test]
    fn limit_of_zero_never_retries() {
        assert_eq!(decide(1, 0), RetryDecision::CriticalFailure);
    }

    #[test]
    fn limit_of_two_allows_one_retry() {
        // First failure retries, second is terminal.
        assert_eq!(decide(1, 2), RetryDecision::Retry);
        assert_eq!(decide(2, 2), RetryDecision::CriticalFailure);
    }
}
