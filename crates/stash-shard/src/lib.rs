//! Blob sharding for Stash.
//!
//! Many backends cap the size of a single item (a cache item, a datastore
//! entity). [`ShardCodec`] stores a larger blob as up to `max_chunks` items
//! of up to `chunk_size` bytes each, keyed `"={offset}={name}"`, and puts it
//! back together on read. Items go to any [`ShardTarget`].
//!
//! # Key Types
//!
//! - [`ShardCodec`] -- Split, write, read, and delete sharded blobs
//! - [`ShardTarget`] -- The bounded-item store shards are written to
//! - [`MemoryShardTarget`] -- In-memory bounded item cache

pub mod codec;
pub mod target;

pub use codec::{shard_key, Shard, ShardCodec};
pub use target::{MemoryShardTarget, ShardTarget};
