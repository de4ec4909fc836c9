use std::collections::HashMap;
use std::sync::RwLock;

use stash_types::{Context, StoreError, StoreResult, BACKEND_ITEM_LIMIT};

/// A bounded-item key/value store that shards are written to.
///
/// Implementations must reject any single item larger than their own item
/// ceiling with `SizeLimitExceeded` rather than truncating it.
pub trait ShardTarget: Send + Sync {
    /// Store one item, replacing any previous value.
    fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Fetch many items in one call. Absent keys are simply left out of the
    /// returned map.
    fn get_multi(&self, ctx: &Context, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>>;

    /// Remove one item. Returns `true` if it existed.
    fn delete(&self, ctx: &Context, key: &str) -> StoreResult<bool>;

    /// Fetch one item.
    fn get(&self, ctx: &Context, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut found = self.get_multi(ctx, &[key.to_string()])?;
        Ok(found.remove(key))
    }

    /// Remove many items, ignoring the ones already absent.
    fn delete_multi(&self, ctx: &Context, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            self.delete(ctx, key)?;
        }
        Ok(())
    }
}

/// In-memory bounded item cache.
///
/// Stands in for a memcache-style service: every item is capped at
/// `item_ceiling` bytes.
#[derive(Debug)]
pub struct MemoryShardTarget {
    items: RwLock<HashMap<String, Vec<u8>>>,
    item_ceiling: usize,
}

impl MemoryShardTarget {
    /// Create an empty cache with the standard backend item ceiling.
    pub fn new() -> Self {
        Self::with_item_ceiling(BACKEND_ITEM_LIMIT)
    }

    pub fn with_item_ceiling(item_ceiling: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            item_ceiling,
        }
    }

    pub fn item_ceiling(&self) -> usize {
        self.item_ceiling
    }

    /// Number of items held.
    pub fn len(&self) -> usize {
        self.items.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of every item key.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .items
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryShardTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardTarget for MemoryShardTarget {
    fn set(&self, ctx: &Context, key: &str, value: &[u8]) -> StoreResult<()> {
        ctx.check()?;
        if value.len() > self.item_ceiling {
            return Err(StoreError::SizeLimitExceeded {
                size: value.len(),
                limit: self.item_ceiling,
            });
        }
        self.items
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_multi(&self, ctx: &Context, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>> {
        ctx.check()?;
        let items = self.items.read().expect("lock poisoned");
        Ok(keys
            .iter()
            .filter_map(|k| items.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    fn delete(&self, ctx: &Context, key: &str) -> StoreResult<bool> {
        ctx.check()?;
        Ok(self.items.write().expect("lock poisoned").remove(key).is_some())
    }
}
