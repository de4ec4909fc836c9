//! Foundation types for Stash.
//!
//! This crate provides the backend-neutral value objects shared by every
//! other Stash crate. Nothing here performs I/O.
//!
//! # Key Types
//!
//! - [`Key`] -- Entity reference: kind, name-or-numeric-id, optional parent
//! - [`Query`] -- Immutable declarative query with a deterministic text dump
//! - [`Context`] -- Per-call deadline and cancellation
//! - [`Limits`] -- Item ceiling, shard geometry, and iterator page size
//! - [`StoreError`] -- Canonical error taxonomy with kind predicates

pub mod context;
pub mod error;
pub mod key;
pub mod limits;
pub mod query;

pub use context::Context;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use key::{Key, KeyIdentity, MAX_ENCODED_KEY_BYTES, MAX_KEY_DEPTH};
pub use limits::{
    Limits, BACKEND_ITEM_LIMIT, DEFAULT_CHUNK_SIZE, DEFAULT_ITEM_CEILING, DEFAULT_MAX_CHUNKS,
    DEFAULT_PAGE_SIZE,
};
pub use query::{compare_values, Direction, Filter, FilterOp, Query};

/// Stored shape of an entity: field name to JSON value.
pub type Properties = serde_json::Map<String, serde_json::Value>;
