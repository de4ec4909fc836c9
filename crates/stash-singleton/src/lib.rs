//! Named blob ("singleton") storage for Stash.
//!
//! A singleton is a byte blob stored under a name, typically a whole
//! serialized object such as a cached lookup table. This crate provides
//! several [`SingletonStore`]s and two decorators that compose with any of
//! them.
//!
//! # Stores
//!
//! - [`DatastoreSingletonStore`] -- Entities of kind `Singleton` on a provider,
//!   optionally sharded
//! - [`CacheSingletonStore`] -- Items in a bounded cache, optionally sharded
//! - [`MemorySingletonStore`] -- A `HashMap`, with a switch to fail every call
//!
//! # Decorators
//!
//! - [`TtlStore`] -- Entries expire a fixed time after they are written
//! - [`ComboStore`] -- Fast primary in front of an authoritative secondary
//!
//! # Typed values
//!
//! [`SingletonStoreExt`] reads and writes any serde value, tagging it with
//! its type so a mismatched read is a `TypeMismatch`.

pub mod cache;
pub mod clock;
pub mod combo;
pub mod datastore;
pub mod memory;
pub mod traits;
pub mod ttl;
pub mod typed;

pub use cache::{cache_key, CacheSingletonStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use combo::ComboStore;
pub use datastore::{payload_capacity, DatastoreSingletonStore, ProviderShardTarget, SHARD_KIND, SINGLETON_KIND};
pub use memory::MemorySingletonStore;
pub use traits::SingletonStore;
pub use ttl::TtlStore;
pub use typed::{decode_value, encode_value, PayloadCodec, PlainCodec, SingletonStoreExt, ZstdCodec};
