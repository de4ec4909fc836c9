//! Two-tier singleton cache.

use stash_types::{Context, StoreResult};
use tracing::debug;

use crate::traits::SingletonStore;

/// A fast, unreliable `primary` in front of an authoritative `secondary`.
///
/// - Reads try the primary and fall back to the secondary on any primary
///   error or miss. The secondary's answer is returned as is.
/// - Writes go to the secondary first and fail if it fails. Only then is
///   the primary written, and its failure is ignored.
/// - Deletes clear the primary best-effort, then the secondary, whose
///   failure is returned.
///
/// With the primary down for good, the combo behaves exactly like the
/// secondary alone.
#[derive(Debug)]
pub struct ComboStore<A, B> {
    primary: A,
    secondary: B,
}

impl<A: SingletonStore, B: SingletonStore> ComboStore<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &A {
        &self.primary
    }

    pub fn secondary(&self) -> &B {
        &self.secondary
    }
}

impl<A: SingletonStore, B: SingletonStore> SingletonStore for ComboStore<A, B> {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.primary.read_singleton(ctx, name) {
            Ok(Some(data)) => return Ok(Some(data)),
            Ok(None) => debug!(name, "primary miss; reading secondary"),
            Err(e) => debug!(name, error = %e, "primary read failed; reading secondary"),
        }
        self.secondary.read_singleton(ctx, name)
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        self.secondary.write_singleton(ctx, name, data)?;
        if let Err(e) = self.primary.write_singleton(ctx, name, data) {
            debug!(name, error = %e, "primary write failed; ignored");
        }
        Ok(())
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        if let Err(e) = self.primary.delete_singleton(ctx, name) {
            debug!(name, error = %e, "primary delete failed; ignored");
        }
        self.secondary.delete_singleton(ctx, name)
    }
}
