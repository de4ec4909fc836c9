use std::time::Instant;

use stash_types::Context;

/// Backend-specific failure values.
///
/// These never cross the provider boundary: [`crate::BackendProvider`]
/// translates each one into a canonical [`stash_types::StoreError`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendFault {
    /// The backend has no entity at the requested key.
    #[error("no such entity")]
    NoSuchEntity,

    /// The call's deadline passed before the backend answered.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The call's context was cancelled.
    #[error("canceled")]
    Cancelled,

    /// The backend could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Anything else the backend reports.
    #[error("{0}")]
    Other(String),
}

/// Result alias for raw backend calls.
pub type BackendResult<T> = Result<T, BackendFault>;

/// Map an expired or cancelled context to the matching backend fault.
pub fn check_context(ctx: &Context) -> BackendResult<()> {
    if ctx.is_cancelled() {
        return Err(BackendFault::Cancelled);
    }
    match ctx.deadline() {
        Some(deadline) if Instant::now() >= deadline => Err(BackendFault::DeadlineExceeded),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn live_context_passes() {
        assert!(check_context(&Context::background()).is_ok());
    }

    #[test]
    fn cancelled_context_is_cancelled_fault() {
        let ctx = Context::background();
        ctx.cancel();
        assert_eq!(check_context(&ctx), Err(BackendFault::Cancelled));
    }

    #[test]
    fn expired_context_is_deadline_fault() {
        let ctx = Context::background().with_deadline(Instant::now() - Duration::from_millis(5));
        assert_eq!(check_context(&ctx), Err(BackendFault::DeadlineExceeded));
    }
}
