use serde::de::DeserializeOwned;
use serde::Serialize;
use stash_types::{Context, Key, Properties, Query, StoreResult};

use crate::error::{BackendFault, BackendResult};
use crate::fetched::Fetched;

/// Raw primitives of a concrete backend client.
///
/// Backends speak in [`Properties`] and [`BackendFault`]s; they know nothing
/// about caller types or canonical errors. Implementations must:
/// - complete incomplete keys on write with a fresh numeric id;
/// - report a missing entity on single-key calls as
///   [`BackendFault::NoSuchEntity`];
/// - honour the context's deadline and cancellation flag.
pub trait Backend: Send + Sync {
    /// Short backend name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Fetch one entity.
    fn get(&self, ctx: &Context, key: &Key) -> BackendResult<Properties>;

    /// Fetch many entities; missing keys come back as `None`, positionally.
    fn get_multi(&self, ctx: &Context, keys: &[Key]) -> BackendResult<Vec<Option<Properties>>> {
        keys.iter()
            .map(|key| match self.get(ctx, key) {
                Ok(props) => Ok(Some(props)),
                Err(BackendFault::NoSuchEntity) => Ok(None),
                Err(fault) => Err(fault),
            })
            .collect()
    }

    /// Store entities and return their complete keys, in input order.
    fn put_multi(&self, ctx: &Context, entries: Vec<(Key, Properties)>) -> BackendResult<Vec<Key>>;

    /// Remove entities. Every present key is removed; if any key was absent
    /// the call reports [`BackendFault::NoSuchEntity`].
    fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> BackendResult<()>;

    /// Execute a query. Keys-only queries return empty property maps.
    fn run_query(&self, ctx: &Context, query: &Query) -> BackendResult<Vec<(Key, Properties)>>;
}

/// Backend-neutral entity storage contract.
///
/// Every error returned by a provider is canonical: one of the
/// [`stash_types::ErrorKind`]s, never a backend-specific value.
pub trait Provider: Send + Sync {
    /// Load the entity at `key`.
    ///
    /// A stored field that `T` does not have is reported as a
    /// `FieldMismatch` warning on the returned [`Fetched`].
    fn get<T>(&self, ctx: &Context, key: &Key) -> StoreResult<Fetched<T>>
    where
        T: Serialize + DeserializeOwned;

    /// Load many entities, positionally matched to `keys`.
    ///
    /// Missing keys leave `None` slots and set a `NotFound` warning.
    fn get_multi<T>(&self, ctx: &Context, keys: &[Key]) -> StoreResult<Fetched<Vec<Option<T>>>>
    where
        T: Serialize + DeserializeOwned;

    /// Materialize every match of `query` in one round trip.
    fn get_all<T>(&self, ctx: &Context, query: &Query) -> StoreResult<Fetched<Vec<(Key, T)>>>
    where
        T: Serialize + DeserializeOwned;

    /// Run `query` keys-only and return the matching keys.
    fn get_all_keys(&self, ctx: &Context, query: &Query) -> StoreResult<Vec<Key>>;

    /// Store `value` at `key`, returning the complete key.
    fn put<T: Serialize>(&self, ctx: &Context, key: &Key, value: &T) -> StoreResult<Key>;

    /// Store `values` at `keys`, returning the complete keys in order.
    fn put_multi<T: Serialize>(&self, ctx: &Context, keys: &[Key], values: &[T]) -> StoreResult<Vec<Key>>;

    /// Remove the entity at `key`. A missing entity is `NotFound`.
    fn delete(&self, ctx: &Context, key: &Key) -> StoreResult<()>;

    fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> StoreResult<()>;

    fn new_incomplete_key(&self, kind: &str, parent: Option<&Key>) -> Key {
        Key::incomplete(kind, parent)
    }

    fn new_name_key(&self, kind: &str, name: &str, parent: Option<&Key>) -> Key {
        Key::named(kind, name, parent)
    }

    fn new_id_key(&self, kind: &str, id: i64, parent: Option<&Key>) -> Key {
        Key::with_id(kind, id, parent)
    }

    fn decode_key(&self, encoded: &str) -> StoreResult<Key> {
        Key::decode(encoded)
    }

    fn key_parent(&self, key: &Key) -> Option<Key> {
        key.parent().cloned()
    }

    /// The key's string name; empty for id-keyed and incomplete keys.
    fn key_name(&self, key: &Key) -> String {
        key.name().unwrap_or_default().to_string()
    }
}
