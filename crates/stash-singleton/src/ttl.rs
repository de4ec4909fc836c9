//! Time-to-live decorator for singleton stores.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_types::{Context, StoreError, StoreResult};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::traits::SingletonStore;

/// What a [`TtlStore`] actually writes to the wrapped store.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Envelope {
    payload: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Wraps a [`SingletonStore`] so entries expire `ttl` after they are
/// written.
///
/// Expiry is checked only on read. An expired entry stays in the wrapped
/// store until it is overwritten or deleted, but reads as `NotFound`. A
/// name the wrapped store has never seen also reads as `NotFound`, whatever
/// the wrapped store's own not-found policy, so the two cannot be told
/// apart. The wrapped store's size ceiling applies to the envelope, which is
/// slightly larger than the payload.
#[derive(Debug)]
pub struct TtlStore<S, C = SystemClock> {
    inner: S,
    ttl: Duration,
    clock: C,
}

impl<S: SingletonStore> TtlStore<S, SystemClock> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, SystemClock)
    }
}

impl<S: SingletonStore, C: Clock> TtlStore<S, C> {
    pub fn with_clock(inner: S, ttl: Duration, clock: C) -> Self {
        Self { inner, ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn expiry(&self) -> StoreResult<DateTime<Utc>> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| StoreError::backend(format!("ttl {:?} out of range", self.ttl), "ttl write"))
    }
}

impl<S: SingletonStore, C: Clock> SingletonStore for TtlStore<S, C> {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let Some(raw) = self.inner.read_singleton(ctx, name)? else {
            return Err(StoreError::NotFound);
        };
        let envelope: Envelope = bincode::deserialize(&raw).map_err(|e| {
            StoreError::TypeMismatch(format!("singleton {name} is not a ttl envelope: {e}"))
        })?;
        let now = self.clock.now();
        if now > envelope.expires_at {
            debug!(name, expired_at = %envelope.expires_at, "ttl singleton expired");
            return Err(StoreError::NotFound);
        }
        Ok(Some(envelope.payload))
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        let envelope = Envelope {
            payload: data.to_vec(),
            expires_at: self.expiry()?,
        };
        let raw = bincode::serialize(&envelope)
            .map_err(|e| StoreError::backend(format!("encoding ttl envelope: {e}"), name))?;
        self.inner.write_singleton(ctx, name, &raw)
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        self.inner.delete_singleton(ctx, name)
    }
}
