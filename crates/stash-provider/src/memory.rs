//! In-memory backend for tests and embedding.
//!
//! [`InMemoryBackend`] holds every entity in a `BTreeMap` behind a `RwLock`.
//! It evaluates queries in-process, assigns ids to incomplete keys, can
//! enforce a per-entity size ceiling, and can be told to fail on demand so
//! callers can exercise their error paths.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use stash_types::{Context, Key, Properties, Query};

use crate::error::{check_context, BackendFault, BackendResult};
use crate::eval::evaluate;
use crate::traits::Backend;

/// Serializable image of an [`InMemoryBackend`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_id: i64,
    pub entities: Vec<(Key, Properties)>,
}

/// Map-backed [`Backend`].
#[derive(Debug)]
pub struct InMemoryBackend {
    entities: RwLock<BTreeMap<Key, Properties>>,
    next_id: AtomicI64,
    item_limit: usize,
    queued_faults: Mutex<VecDeque<BackendFault>>,
    sticky_fault: Mutex<Option<BackendFault>>,
}

impl InMemoryBackend {
    /// Create a new empty backend with no item ceiling.
    pub fn new() -> Self {
        Self::with_item_limit(usize::MAX)
    }

    /// Create a backend that rejects entities whose JSON encoding exceeds
    /// `item_limit` bytes, as a hosted datastore would (see
    /// [`stash_types::BACKEND_ITEM_LIMIT`]).
    pub fn with_item_limit(item_limit: usize) -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            item_limit,
            queued_faults: Mutex::new(VecDeque::new()),
            sticky_fault: Mutex::new(None),
        }
    }

    /// Rebuild a backend from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let backend = Self::new();
        backend.next_id.store(snapshot.next_id.max(1), Ordering::SeqCst);
        backend
            .entities
            .write()
            .expect("lock poisoned")
            .extend(snapshot.entities);
        backend
    }

    /// Capture the current contents.
    pub fn snapshot(&self) -> Snapshot {
        let map = self.entities.read().expect("lock poisoned");
        Snapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            entities: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Replace the current contents with `snapshot`.
    pub fn restore(&self, snapshot: Snapshot) {
        let mut map = self.entities.write().expect("lock poisoned");
        map.clear();
        map.extend(snapshot.entities);
        self.next_id.store(snapshot.next_id.max(1), Ordering::SeqCst);
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entities.read().expect("lock poisoned").is_empty()
    }

    /// Remove all entities.
    pub fn clear(&self) {
        self.entities.write().expect("lock poisoned").clear();
    }

    /// Sorted list of every stored key.
    pub fn all_keys(&self) -> Vec<Key> {
        self.entities
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Make the next backend call fail with `fault`. Queued faults are
    /// consumed one per call, in order.
    pub fn fail_next(&self, fault: BackendFault) {
        self.queued_faults
            .lock()
            .expect("lock poisoned")
            .push_back(fault);
    }

    /// Make every backend call fail with `fault` until cleared with `None`.
    pub fn fail_always(&self, fault: Option<BackendFault>) {
        *self.sticky_fault.lock().expect("lock poisoned") = fault;
    }

    fn preflight(&self, ctx: &Context) -> BackendResult<()> {
        check_context(ctx)?;
        if let Some(fault) = self.sticky_fault.lock().expect("lock poisoned").clone() {
            return Err(fault);
        }
        match self.queued_faults.lock().expect("lock poisoned").pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn encoded_size(props: &Properties) -> usize {
        serde_json::to_vec(props).map(|b| b.len()).unwrap_or(usize::MAX)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, ctx: &Context, key: &Key) -> BackendResult<Properties> {
        self.preflight(ctx)?;
        let map = self.entities.read().expect("lock poisoned");
        map.get(key).cloned().ok_or(BackendFault::NoSuchEntity)
    }

    fn get_multi(&self, ctx: &Context, keys: &[Key]) -> BackendResult<Vec<Option<Properties>>> {
        self.preflight(ctx)?;
        let map = self.entities.read().expect("lock poisoned");
        Ok(keys.iter().map(|key| map.get(key).cloned()).collect())
    }

    fn put_multi(&self, ctx: &Context, entries: Vec<(Key, Properties)>) -> BackendResult<Vec<Key>> {
        self.preflight(ctx)?;
        for (key, props) in entries.iter().filter(|_| self.item_limit != usize::MAX) {
            let size = Self::encoded_size(props);
            if size > self.item_limit {
                return Err(BackendFault::Other(format!(
                    "entity {key} is {size} bytes, over the {} byte item limit",
                    self.item_limit
                )));
            }
        }

        let mut map = self.entities.write().expect("lock poisoned");
        let mut keys = Vec::with_capacity(entries.len());
        for (key, props) in entries {
            let key = if key.is_incomplete() {
                key.completed(self.next_id.fetch_add(1, Ordering::SeqCst))
            } else {
                key
            };
            map.insert(key.clone(), props);
            keys.push(key);
        }
        Ok(keys)
    }

    fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> BackendResult<()> {
        self.preflight(ctx)?;
        let mut map = self.entities.write().expect("lock poisoned");
        let mut missing = false;
        for key in keys {
            missing |= map.remove(key).is_none();
        }
        if missing {
            Err(BackendFault::NoSuchEntity)
        } else {
            Ok(())
        }
    }

    fn run_query(&self, ctx: &Context, query: &Query) -> BackendResult<Vec<(Key, Properties)>> {
        self.preflight(ctx)?;
        let map = self.entities.read().expect("lock poisoned");
        evaluate(map.iter(), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(i: i64) -> Properties {
        let mut p = Properties::new();
        p.insert("I".into(), json!(i));
        p
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let ctx = Context::background();
        let backend = InMemoryBackend::new();
        let key = Key::named("T", "a", None);
        let keys = backend.put_multi(&ctx, vec![(key.clone(), props(1))]).unwrap();
        assert_eq!(keys, vec![key.clone()]);
        assert_eq!(backend.get(&ctx, &key).unwrap(), props(1));
    }

    #[test]
    fn incomplete_keys_get_distinct_ids() {
        let ctx = Context::background();
        let backend = InMemoryBackend::new();
        let keys = backend
            .put_multi(
                &ctx,
                vec![
                    (Key::incomplete("T", None), props(1)),
                    (Key::incomplete("T", None), props(2)),
                ],
            )
            .unwrap();
        assert!(keys.iter().all(|k| !k.is_incomplete()));
        assert_ne!(keys[0], keys[1]);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn missing_get_is_no_such_entity() {
        let backend = InMemoryBackend::new();
        let err = backend
            .get(&Context::background(), &Key::named("T", "nope", None))
            .unwrap_err();
        assert_eq!(err, BackendFault::NoSuchEntity);
    }

    #[test]
    fn delete_reports_missing_but_removes_present() {
        let ctx = Context::background();
        let backend = InMemoryBackend::new();
        let present = Key::named("T", "a", None);
        backend.put_multi(&ctx, vec![(present.clone(), props(1))]).unwrap();
        let err = backend
            .delete_multi(&ctx, &[present, Key::named("T", "gone", None)])
            .unwrap_err();
        assert_eq!(err, BackendFault::NoSuchEntity);
        assert!(backend.is_empty());
    }

    #[test]
    fn oversize_entity_rejected() {
        let ctx = Context::background();
        let backend = InMemoryBackend::with_item_limit(16);
        let mut big = Properties::new();
        big.insert("blob".into(), json!("x".repeat(64)));
        let err = backend
            .put_multi(&ctx, vec![(Key::named("T", "a", None), big)])
            .unwrap_err();
        assert!(matches!(err, BackendFault::Other(_)));
        assert!(backend.is_empty());
    }

    // -----------------------------------------------------------------------
    // Fault injection and snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn queued_fault_fires_once() {
        let ctx = Context::background();
        let backend = InMemoryBackend::new();
        backend.fail_next(BackendFault::Unavailable("down".into()));
        let key = Key::named("T", "a", None);
        assert!(backend.get_multi(&ctx, &[key.clone()]).is_err());
        assert_eq!(backend.get_multi(&ctx, &[key]).unwrap(), vec![None]);
    }

    #[test]
    fn sticky_fault_until_cleared() {
        let ctx = Context::background();
        let backend = InMemoryBackend::new();
        backend.fail_always(Some(BackendFault::Other("broken".into())));
        assert!(backend.run_query(&ctx, &Query::new("T")).is_err());
        assert!(backend.run_query(&ctx, &Query::new("T")).is_err());
        backend.fail_always(None);
        assert!(backend.run_query(&ctx, &Query::new("T")).is_ok());
    }

    #[test]
    fn cancelled_context_fails_call() {
        let ctx = Context::background();
        ctx.cancel();
        let err = InMemoryBackend::new()
            .get(&ctx, &Key::named("T", "a", None))
            .unwrap_err();
        assert_eq!(err, BackendFault::Cancelled);
    }

    #[test]
    fn snapshot_restores_contents_and_ids() {
        let ctx = Context::background();
        let backend = InMemoryBackend::new();
        let first = backend
            .put_multi(&ctx, vec![(Key::incomplete("T", None), props(1))])
            .unwrap();

        let restored = InMemoryBackend::from_snapshot(backend.snapshot());
        assert_eq!(restored.all_keys(), first);
        let next = restored
            .put_multi(&ctx, vec![(Key::incomplete("T", None), props(2))])
            .unwrap();
        assert_ne!(next[0], first[0]);
    }
}
