//! Cache-style singleton store over a bounded item cache.

use stash_shard::{ShardCodec, ShardTarget};
use stash_types::{Context, Limits, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::traits::SingletonStore;

/// Item key of an unsharded singleton in the cache.
pub fn cache_key(name: &str) -> String {
    format!("singleton:{name}")
}

/// Singletons kept in a bounded-item cache such as memcache.
///
/// Unsharded payloads live in one item under `singleton:<name>` and are
/// capped at the item ceiling. With [`with_sharding`](Self::with_sharding)
/// they are split across `={offset}={name}` items instead. A cache miss reads
/// as `Ok(None)` unless [`err_if_not_found`](Self::err_if_not_found) is set.
#[derive(Debug)]
pub struct CacheSingletonStore<S> {
    target: S,
    limits: Limits,
    err_if_not_found: bool,
    codec: Option<ShardCodec>,
}

impl<S: ShardTarget> CacheSingletonStore<S> {
    pub fn new(target: S) -> Self {
        Self::with_limits(target, Limits::default())
    }

    pub fn with_limits(target: S, limits: Limits) -> Self {
        Self {
            target,
            limits,
            err_if_not_found: false,
            codec: None,
        }
    }

    /// Report cache misses as `NotFound` rather than `Ok(None)`.
    pub fn err_if_not_found(mut self, yes: bool) -> Self {
        self.err_if_not_found = yes;
        self
    }

    /// Spread payloads across shards.
    pub fn with_sharding(mut self) -> Self {
        self.codec = Some(ShardCodec::from_limits(&self.limits));
        self
    }

    /// The underlying cache.
    pub fn target(&self) -> &S {
        &self.target
    }

    /// Largest payload this store accepts.
    pub fn ceiling(&self) -> usize {
        self.codec
            .map_or(self.limits.item_ceiling, |codec| codec.ceiling())
    }

    fn miss(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        if self.err_if_not_found {
            return Err(StoreError::NotFound);
        }
        debug!(name, "singleton cache miss");
        Ok(None)
    }
}

impl<S: ShardTarget> SingletonStore for CacheSingletonStore<S> {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = match &self.codec {
            Some(codec) => codec.read(&self.target, ctx, name).map(Some),
            None => self.target.get(ctx, &cache_key(name)),
        };
        match result {
            Ok(Some(data)) => Ok(Some(data)),
            Ok(None) => self.miss(name),
            Err(e) if e.is_not_found() => self.miss(name),
            Err(e) => {
                warn!(name, error = %e, "singleton cache read failed");
                Err(e.with_context(format!("reading cached singleton {name}")))
            }
        }
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        match &self.codec {
            Some(codec) => codec.write(&self.target, ctx, name, data),
            None if data.len() > self.limits.item_ceiling => Err(StoreError::SizeLimitExceeded {
                size: data.len(),
                limit: self.limits.item_ceiling,
            }),
            None => self.target.set(ctx, &cache_key(name), data),
        }
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        match &self.codec {
            Some(codec) => codec.delete(&self.target, ctx, name),
            None => self.target.delete(ctx, &cache_key(name)).map(|_| ()),
        }
    }
}
