use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{StoreError, StoreResult};

/// Per-call deadline and cancellation.
///
/// Every storage call takes a `&Context`. Providers check it before each
/// backend call and pass it down; nothing retries on expiry. Contexts derived
/// with [`Context::with_timeout`] share the parent's cancellation flag, so
/// cancelling a parent cancels every derived context.
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context with no deadline that is never cancelled unless asked.
    pub fn background() -> Self {
        Self::default()
    }

    /// A derived context that expires after `timeout` (or earlier, if the
    /// parent's deadline comes first).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A derived context that expires at `deadline` (or earlier).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Cancel this context and everything derived from it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `Ok` while the call may proceed; a backend error once cancelled or
    /// past the deadline.
    pub fn check(&self) -> StoreResult<()> {
        if self.is_cancelled() {
            return Err(StoreError::backend("context canceled", ""));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StoreError::backend("context deadline exceeded", ""));
            }
        }
        Ok(())
    }
}
