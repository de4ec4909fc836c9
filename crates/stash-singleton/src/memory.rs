//! In-memory singleton store for tests and ephemeral use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use stash_types::{Context, StoreError, StoreResult};

use crate::traits::SingletonStore;

/// A [`SingletonStore`] backed by a `HashMap`.
///
/// A missing name reads as `NotFound`. Flipping
/// [`set_always_fail`](Self::set_always_fail) makes every call fail with a
/// backend error, which is how tiered compositions are exercised.
#[derive(Debug, Default)]
pub struct MemorySingletonStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    always_fail: AtomicBool,
}

impl MemorySingletonStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or stop failing).
    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    pub fn is_failing(&self) -> bool {
        self.always_fail.load(Ordering::SeqCst)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    fn preflight(&self, ctx: &Context, op: &str, name: &str) -> StoreResult<()> {
        ctx.check()?;
        if self.is_failing() {
            return Err(StoreError::backend(
                "memory singleton store asked to always fail",
                format!("{op} {name}"),
            ));
        }
        Ok(())
    }
}

impl SingletonStore for MemorySingletonStore {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        self.preflight(ctx, "read", name)?;
        match self.blobs.read().expect("lock poisoned").get(name) {
            Some(data) => Ok(Some(data.clone())),
            None => Err(StoreError::NotFound),
        }
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        self.preflight(ctx, "write", name)?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        self.preflight(ctx, "delete", name)?;
        self.blobs.write().expect("lock poisoned").remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_types::ErrorKind;

    #[test]
    fn write_read_delete() {
        let ctx = Context::background();
        let store = MemorySingletonStore::new();
        assert!(store.read_singleton(&ctx, "a").unwrap_err().is_not_found());

        store.write_singleton(&ctx, "a", b"one").unwrap();
        store.write_singleton(&ctx, "a", b"two").unwrap();
        assert_eq!(store.read_singleton(&ctx, "a").unwrap(), Some(b"two".to_vec()));

        store.delete_singleton(&ctx, "a").unwrap();
        store.delete_singleton(&ctx, "a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn always_fail_blocks_every_call() {
        let ctx = Context::background();
        let store = MemorySingletonStore::new();
        store.write_singleton(&ctx, "a", b"x").unwrap();
        store.set_always_fail(true);
        assert_eq!(
            store.read_singleton(&ctx, "a").unwrap_err().kind(),
            ErrorKind::Backend
        );
        assert!(store.write_singleton(&ctx, "a", b"y").is_err());
        store.set_always_fail(false);
        assert_eq!(store.read_singleton(&ctx, "a").unwrap(), Some(b"x".to_vec()));
    }
}
