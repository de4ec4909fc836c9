use serde::{Deserialize, Serialize};

/// Hard per-item ceiling of the reference backends.
pub const BACKEND_ITEM_LIMIT: usize = 1_000_000;

/// Largest payload written as a single item, leaving headroom under
/// [`BACKEND_ITEM_LIMIT`] for key and framing overhead.
pub const DEFAULT_ITEM_CEILING: usize = 950_000;

/// Default shard size for the sharding codec.
pub const DEFAULT_CHUNK_SIZE: usize = 950_000;

/// Default cap on the number of shards per logical blob.
pub const DEFAULT_MAX_CHUNKS: usize = 32;

/// Default batching iterator page size.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Size policy shared by the shard codec, the singleton stores, and the
/// batching iterator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest unsharded payload, in bytes.
    pub item_ceiling: usize,
    /// Size of each shard, in bytes.
    pub chunk_size: usize,
    /// Maximum shards per logical blob.
    pub max_chunks: usize,
    /// Values fetched per iterator page.
    pub page_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            item_ceiling: DEFAULT_ITEM_CEILING,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Limits {
    /// Largest payload storable through the sharding codec.
    pub fn sharded_ceiling(&self) -> usize {
        self.chunk_size.saturating_mul(self.max_chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let l = Limits::default();
        assert_eq!(l.item_ceiling, 950_000);
        assert_eq!(l.chunk_size, 950_000);
        assert_eq!(l.max_chunks, 32);
        assert_eq!(l.page_size, 10);
        assert!(l.item_ceiling < BACKEND_ITEM_LIMIT);
        assert_eq!(l.sharded_ceiling(), 32 * 950_000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let l: Limits = serde_json::from_str(r#"{"max_chunks": 4}"#).unwrap();
        assert_eq!(l.max_chunks, 4);
        assert_eq!(l.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
