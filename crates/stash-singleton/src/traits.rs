use std::sync::Arc;

use stash_types::{Context, StoreResult};

/// Storage for named byte blobs ("singletons").
///
/// All implementations must satisfy these invariants:
/// - A write replaces any earlier value under the same name.
/// - A read returns exactly the bytes of the latest successful write.
/// - A missing name is reported either as `Ok(None)` or as a `NotFound`
///   error, depending on the store's not-found policy; never as any other
///   error kind.
/// - Deleting a missing name succeeds.
pub trait SingletonStore: Send + Sync {
    /// Read the blob called `name`.
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `data` under `name`.
    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()>;

    /// Remove the blob called `name`.
    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()>;
}

impl<S: SingletonStore + ?Sized> SingletonStore for Arc<S> {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).read_singleton(ctx, name)
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        (**self).write_singleton(ctx, name, data)
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        (**self).delete_singleton(ctx, name)
    }
}

impl<S: SingletonStore + ?Sized> SingletonStore for Box<S> {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).read_singleton(ctx, name)
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        (**self).write_singleton(ctx, name, data)
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        (**self).delete_singleton(ctx, name)
    }
}
