//! Deadline enforcement for outbound calls.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the wrapped future is dropped on expiry
//! - A timeout is reported as its own error, distinct from the call's errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeadlineError<E> {
    #[error("deadline of {0:?} exceeded")]
    Elapsed(Duration),

    #[error(transparent)]
    Inner(E),
}

/// Run a fallible future under a deadline.
pub async fn with_deadline<F, T, E>(deadline: Duration, fut: F) -> Result<T, DeadlineError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DeadlineError::Inner(e)),
        Err(_) => Err(DeadlineError::Elapsed(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let ok: Result<u32, DeadlineError<&str>> =
            with_deadline(Duration::from_secs(1), async { Ok::<_, &str>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_deadline(Duration::from_secs(1), async { Err::<u32, _>("boom") }).await;
        assert_eq!(err, Err(DeadlineError::Inner("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ()>(())
        };
        let result = with_deadline(Duration::from_millis(50), slow).await;
        assert_eq!(result, Err(DeadlineError::Elapsed(Duration::from_millis(50))));
    }
}
