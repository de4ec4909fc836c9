//! Backend-neutral entity storage for Stash.
//!
//! Application code talks to a [`Provider`]; a provider talks to one
//! [`Backend`]. The split keeps backend quirks in one place: every backend
//! fault is translated into a canonical [`stash_types::StoreError`] exactly
//! once, inside [`BackendProvider`], and nothing above that layer ever sees
//! a backend-specific error.
//!
//! # Modules
//!
//! - [`traits`] -- The [`Provider`] contract and the raw [`Backend`] seam
//! - [`provider`] -- [`BackendProvider`], the translating provider
//! - [`fetched`] -- [`Fetched`], the partial-success carrier for reads
//! - [`iterator`] -- [`BatchIterator`], paged iteration over a query
//! - [`memory`] -- [`InMemoryBackend`] with query evaluation and fault injection
//! - [`file`] -- [`FileBackend`], a JSON snapshot on disk
//! - [`codec`] -- Caller types to entity properties and back
//!
//! # Design Rules
//!
//! 1. All calls are synchronous and take a [`stash_types::Context`].
//! 2. Nothing retries. A failed call fails.
//! 3. Partial reads succeed with a warning rather than failing outright.

pub mod codec;
pub mod error;
mod eval;
pub mod fetched;
pub mod file;
pub mod iterator;
pub mod memory;
pub mod provider;
pub mod traits;

pub use error::{check_context, BackendFault, BackendResult};
pub use fetched::Fetched;
pub use file::FileBackend;
pub use iterator::BatchIterator;
pub use memory::{InMemoryBackend, Snapshot};
pub use provider::BackendProvider;
pub use traits::{Backend, Provider};

/// Provider over the in-memory backend, the usual choice in tests.
pub type MemoryProvider = BackendProvider<InMemoryBackend>;
