//! Per-attempt timeout enforcement.
//!
//! Wraps a single future with a hard deadline using `tokio::time::timeout`. Used by
//! [`crate::invoker::RequestInvoker`] implementations to bound a single HTTP exchange
//! (`BoundConfiguration::request_timeout`) and by [`crate::pipeline::RequestPipeline`]
//! to bound the whole call (`BoundConfiguration::max_retry_timeout`).
//!
//! On timeout the inner future is dropped, not forcibly aborted; cancellation-unsafe
//! work may leave partial state on the other side of the wire.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum allowed timeout duration (30 days), to guard against accidental `u64::MAX`
/// timeouts while still permitting long-running calls.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors returned when constructing a [`TimeoutPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    /// Duration must be greater than zero.
    #[error("timeout duration must be > 0")]
    ZeroDuration,
    /// Duration exceeded the configured maximum.
    #[error("timeout duration {requested:?} exceeds maximum allowed {limit:?}")]
    ExceedsMaximum {
        /// Duration requested by the caller.
        requested: Duration,
        /// Maximum allowed duration for this construction.
        limit: Duration,
    },
}

/// The outcome of a timed operation: either it finished, or the deadline elapsed first.
#[derive(Debug)]
pub enum Elapsed<T> {
    /// The operation completed before the deadline.
    Completed(T),
    /// The deadline elapsed; `elapsed` is measured from just before the operation started.
    TimedOut {
        /// Wall-clock time actually observed before the timeout fired.
        elapsed: Duration,
        /// The configured timeout.
        timeout: Duration,
    },
}

/// Enforces a maximum duration on an async operation.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    /// Creates a timeout policy, rejecting zero or excessively long durations.
    #[must_use = "the result must be checked for validation errors"]
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        Self::new_with_max(duration, MAX_TIMEOUT)
    }

    /// Construct with a caller-specified maximum allowed timeout.
    pub fn new_with_max(duration: Duration, max: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::ZeroDuration);
        }
        if duration > max {
            return Err(TimeoutError::ExceedsMaximum { requested: duration, limit: max });
        }
        Ok(Self { duration })
    }

    /// Returns the configured timeout duration.
    #[must_use]
    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs `fut` to completion or until the deadline elapses, whichever comes first.
    pub async fn run<T>(&self, fut: impl Future<Output = T>) -> Elapsed<T> {
        let start = Instant::now();
        match tokio::time::timeout(self.duration, fut).await {
            Ok(value) => Elapsed::Completed(value),
            Err(_) => Elapsed::TimedOut { elapsed: start.elapsed(), timeout: self.duration },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_duration() {
        let err = TimeoutPolicy::new(Duration::ZERO).unwrap_err();
        assert!(matches!(err, TimeoutError::ZeroDuration));
    }

    #[test]
    fn rejects_excessive_duration() {
        let too_big = MAX_TIMEOUT + Duration::from_secs(1);
        let err = TimeoutPolicy::new(too_big).unwrap_err();
        assert!(
            matches!(err, TimeoutError::ExceedsMaximum { requested, limit } if requested == too_big && limit == MAX_TIMEOUT)
        );
    }

    #[test]
    fn accepts_max_timeout() {
        let policy = TimeoutPolicy::new(MAX_TIMEOUT).expect("should accept max boundary");
        assert_eq!(policy.duration(), MAX_TIMEOUT);
    }

    #[tokio::test]
    async fn completes_before_timeout() {
        let policy = TimeoutPolicy::new(Duration::from_millis(100)).unwrap();
        let result = policy.run(async { 42 }).await;
        assert!(matches!(result, Elapsed::Completed(42)));
    }

    #[tokio::test]
    async fn times_out_long_operation() {
        tokio::time::pause();
        let policy = TimeoutPolicy::new(Duration::from_millis(50)).unwrap();
        let fut = policy.run(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            42
        });
        tokio::pin!(fut);
        tokio::time::advance(Duration::from_millis(51)).await;
        let result = fut.await;
        match result {
            Elapsed::TimedOut { timeout, .. } => assert_eq!(timeout, Duration::from_millis(50)),
            Elapsed::Completed(_) => panic!("expected timeout"),
        }
    }
}
