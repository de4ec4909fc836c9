//! Singleton store on top of a [`Provider`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stash_provider::Provider;
use stash_shard::{ShardCodec, ShardTarget};
use stash_types::{Context, Key, Limits, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::traits::SingletonStore;

/// Entity kind of single-item singleton records.
pub const SINGLETON_KIND: &str = "Singleton";

/// Entity kind of sharded singleton pieces.
pub const SHARD_KIND: &str = "SingletonShard";

/// Stored shape of a singleton or a shard. The payload is hex-encoded so the
/// record fits any JSON-shaped backend.
#[derive(Debug, Serialize, Deserialize)]
struct BlobRecord {
    #[serde(rename = "Value", with = "hex_bytes")]
    value: Vec<u8>,
}

/// Encoded size of a `BlobRecord` with an empty payload: `{"Value":""}`.
const RECORD_OVERHEAD: usize = 12;

/// Largest payload whose encoded `BlobRecord` fits in `stored` bytes. Hex
/// doubles the payload.
pub fn payload_capacity(stored: usize) -> usize {
    (stored.saturating_sub(RECORD_OVERHEAD) / 2).max(1)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// A [`ShardTarget`] that stores each shard as one `SingletonShard` entity.
#[derive(Debug)]
pub struct ProviderShardTarget<P> {
    provider: Arc<P>,
    item_ceiling: usize,
}

impl<P: Provider> ProviderShardTarget<P> {
    pub fn new(provider: Arc<P>, item_ceiling: usize) -> Self {
        Self {
            provider,
            item_ceiling,
        }
    }

    fn key(&self, item: &str) -> Key {
        self.provider.new_name_key(SHARD_KIND, item, None)
    }
}

impl<P: Provider> ShardTarget for ProviderShardTarget<P> {
    fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> StoreResult<()> {
        if value.len() > self.item_ceiling {
            return Err(StoreError::SizeLimitExceeded {
                size: value.len(),
                limit: self.item_ceiling,
            });
        }
        let record = BlobRecord {
            value: value.to_vec(),
        };
        self.provider.put(ctx, &self.key(key), &record)?;
        Ok(())
    }

    fn get_multi(&self, ctx: &Context, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>> {
        let entity_keys: Vec<Key> = keys.iter().map(|k| self.key(k)).collect();
        // Missing shards are expected here; the codec decides what they mean.
        let records = self
            .provider
            .get_multi::<BlobRecord>(ctx, &entity_keys)?
            .into_value();
        Ok(keys
            .iter()
            .zip(records)
            .filter_map(|(k, r)| r.map(|r| (k.clone(), r.value)))
            .collect())
    }

    fn delete(&self, ctx: &Context, key: &str) -> StoreResult<bool> {
        match self.provider.delete(ctx, &self.key(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_multi(&self, ctx: &Context, keys: &[String]) -> StoreResult<()> {
        let entity_keys: Vec<Key> = keys.iter().map(|k| self.key(k)).collect();
        match self.provider.delete_multi(ctx, &entity_keys) {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }
}

/// Singletons stored as entities of kind [`SINGLETON_KIND`], keyed by name.
///
/// By default a missing singleton is logged and read as `Ok(None)`; set
/// [`err_if_not_found`](Self::err_if_not_found) to get `NotFound` instead.
/// `Limits` bound the stored record, not the payload: a record holds at most
/// [`payload_capacity`] of the item ceiling (or, when sharded, of the chunk
/// size) in payload bytes. Payloads over [`ceiling`](Self::ceiling) are
/// rejected before any I/O.
#[derive(Debug)]
pub struct DatastoreSingletonStore<P> {
    provider: Arc<P>,
    limits: Limits,
    err_if_not_found: bool,
    sharding: Option<(ShardCodec, ProviderShardTarget<P>)>,
}

impl<P: Provider> DatastoreSingletonStore<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_limits(provider, Limits::default())
    }

    pub fn with_limits(provider: Arc<P>, limits: Limits) -> Self {
        Self {
            provider,
            limits,
            err_if_not_found: false,
            sharding: None,
        }
    }

    /// Report missing singletons as `NotFound` rather than `Ok(None)`.
    pub fn err_if_not_found(mut self, yes: bool) -> Self {
        self.err_if_not_found = yes;
        self
    }

    /// Store payloads through the sharding codec, raising the ceiling to
    /// `max_chunks` shards of `payload_capacity(chunk_size)` bytes each.
    pub fn with_sharding(mut self) -> Self {
        let chunk = payload_capacity(self.limits.chunk_size);
        let codec = ShardCodec::new(chunk, self.limits.max_chunks);
        let target = ProviderShardTarget::new(Arc::clone(&self.provider), chunk);
        self.sharding = Some((codec, target));
        self
    }

    /// Largest payload this store accepts.
    pub fn ceiling(&self) -> usize {
        match &self.sharding {
            Some((codec, _)) => codec.ceiling(),
            None => payload_capacity(self.limits.item_ceiling),
        }
    }

    pub fn is_sharded(&self) -> bool {
        self.sharding.is_some()
    }

    fn key(&self, name: &str) -> Key {
        self.provider.new_name_key(SINGLETON_KIND, name, None)
    }

    fn missing(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        if self.err_if_not_found {
            return Err(StoreError::NotFound);
        }
        warn!(name, "singleton not found; treating as empty");
        Ok(None)
    }
}

impl<P: Provider> SingletonStore for DatastoreSingletonStore<P> {
    fn read_singleton(&self, ctx: &Context, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = match &self.sharding {
            Some((codec, target)) => codec.read(target, ctx, name),
            None => self
                .provider
                .get::<BlobRecord>(ctx, &self.key(name))
                .map(|fetched| fetched.into_value().value),
        };
        match result {
            Ok(data) => {
                debug!(name, bytes = data.len(), "read singleton");
                Ok(Some(data))
            }
            Err(e) if e.is_not_found() => self.missing(name),
            Err(e) => Err(e.with_context(format!("reading singleton {name}"))),
        }
    }

    fn write_singleton(&self, ctx: &Context, name: &str, data: &[u8]) -> StoreResult<()> {
        let result = match &self.sharding {
            Some((codec, target)) => codec.write(target, ctx, name, data),
            None => {
                let limit = self.ceiling();
                if data.len() > limit {
                    return Err(StoreError::SizeLimitExceeded {
                        size: data.len(),
                        limit,
                    });
                }
                let record = BlobRecord {
                    value: data.to_vec(),
                };
                self.provider.put(ctx, &self.key(name), &record).map(|_| ())
            }
        };
        result.map_err(|e| e.with_context(format!("writing singleton {name}")))?;
        debug!(name, bytes = data.len(), "wrote singleton");
        Ok(())
    }

    fn delete_singleton(&self, ctx: &Context, name: &str) -> StoreResult<()> {
        let result = match &self.sharding {
            Some((codec, target)) => codec.delete(target, ctx, name),
            None => self.provider.delete(ctx, &self.key(name)),
        };
        match result {
            Err(e) if !e.is_not_found() => {
                Err(e.with_context(format!("deleting singleton {name}")))
            }
            _ => Ok(()),
        }
    }
}
