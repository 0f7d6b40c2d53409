//! Panic and deadline containment for work that must always finish.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("did not finish within {0:?}")]
    Elapsed(Duration),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Run `fut` to completion, converting a panic or an overrun into an error.
///
/// On expiry the future is dropped.
pub async fn guarded<F>(deadline: Duration, fut: F) -> Result<F::Output, GuardError>
where
    F: Future,
{
    match tokio::time::timeout(deadline, AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(payload)) => Err(GuardError::Panicked(panic_message(payload.as_ref()))),
        Err(_) => Err(GuardError::Elapsed(deadline)),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
