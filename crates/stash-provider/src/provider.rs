use serde::de::DeserializeOwned;
use serde::Serialize;
use stash_types::{Context, Key, Query, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::codec::{decode_entity, encode_entity};
use crate::error::BackendFault;
use crate::fetched::Fetched;
use crate::traits::{Backend, Provider};

/// [`Provider`] over any [`Backend`].
///
/// This is the one place backend faults become canonical errors:
/// - [`BackendFault::NoSuchEntity`] becomes `NotFound`;
/// - every other fault becomes `Backend { message, context }`, where the
///   context names the operation and the key or rendered query.
///
/// The context is checked before every backend call.
#[derive(Debug)]
pub struct BackendProvider<B> {
    backend: B,
}

impl<B: Backend> BackendProvider<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn translate(&self, fault: BackendFault, context: String) -> StoreError {
        match fault {
            BackendFault::NoSuchEntity => {
                debug!(backend = self.backend.name(), %context, "no such entity");
                StoreError::NotFound
            }
            other => {
                warn!(backend = self.backend.name(), %context, fault = %other, "backend call failed");
                StoreError::backend(other.to_string(), context)
            }
        }
    }

    fn preflight(&self, ctx: &Context, context: impl FnOnce() -> String) -> StoreResult<()> {
        ctx.check().map_err(|e| match e {
            StoreError::Backend { message, .. } => StoreError::backend(message, context()),
            other => other,
        })
    }
}

fn describe_keys(op: &str, keys: &[Key]) -> String {
    match keys {
        [] => format!("{op} (no keys)"),
        [only] => format!("{op} {only}"),
        [first, ..] => format!("{op} {first} and {} more", keys.len() - 1),
    }
}

fn describe_query(op: &str, query: &Query) -> String {
    format!("{op}\n{query}")
}

impl<B: Backend> Provider for BackendProvider<B> {
    fn get<T>(&self, ctx: &Context, key: &Key) -> StoreResult<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let context = || format!("get {key}");
        self.preflight(ctx, context)?;
        let props = self
            .backend
            .get(ctx, key)
            .map_err(|fault| self.translate(fault, context()))?;
        let (value, warning) = decode_entity(props).map_err(|e| e.with_context(context()))?;
        if let Some(w) = &warning {
            debug!(%key, warning = %w, "decoded with warning");
        }
        Ok(Fetched::with_warning(value, warning))
    }

    fn get_multi<T>(&self, ctx: &Context, keys: &[Key]) -> StoreResult<Fetched<Vec<Option<T>>>>
    where
        T: Serialize + DeserializeOwned,
    {
        let context = || describe_keys("get_multi", keys);
        self.preflight(ctx, context)?;
        let slots = self
            .backend
            .get_multi(ctx, keys)
            .map_err(|fault| self.translate(fault, context()))?;

        let mut values = Vec::with_capacity(slots.len());
        let mut missing = 0usize;
        let mut mismatch = None;
        for (key, slot) in keys.iter().zip(slots) {
            match slot {
                Some(props) => {
                    let (value, warning) =
                        decode_entity(props).map_err(|e| e.with_context(format!("get_multi {key}")))?;
                    if mismatch.is_none() {
                        mismatch = warning;
                    }
                    values.push(Some(value));
                }
                None => {
                    missing += 1;
                    values.push(None);
                }
            }
        }

        let warning = if missing > 0 {
            debug!(missing, requested = keys.len(), "get_multi left empty slots");
            Some(StoreError::NotFound.with_context(format!(
                "{missing} of {} keys not found",
                keys.len()
            )))
        } else {
            mismatch
        };
        Ok(Fetched::with_warning(values, warning))
    }

    fn get_all<T>(&self, ctx: &Context, query: &Query) -> StoreResult<Fetched<Vec<(Key, T)>>>
    where
        T: Serialize + DeserializeOwned,
    {
        let context = || describe_query("get_all", query);
        self.preflight(ctx, context)?;
        let rows = self
            .backend
            .run_query(ctx, query)
            .map_err(|fault| self.translate(fault, context()))?;

        let mut out = Vec::with_capacity(rows.len());
        let mut mismatch = None;
        for (key, props) in rows {
            let (value, warning) = decode_entity(props).map_err(|e| e.with_context(context()))?;
            if mismatch.is_none() {
                mismatch = warning;
            }
            out.push((key, value));
        }
        debug!(kind = query.kind(), results = out.len(), "get_all");
        Ok(Fetched::with_warning(out, mismatch))
    }

    fn get_all_keys(&self, ctx: &Context, query: &Query) -> StoreResult<Vec<Key>> {
        let query = query.clone().keys_only();
        let context = || describe_query("get_all_keys", &query);
        self.preflight(ctx, context)?;
        let rows = self
            .backend
            .run_query(ctx, &query)
            .map_err(|fault| self.translate(fault, context()))?;
        Ok(rows.into_iter().map(|(key, _)| key).collect())
    }

    fn put<T: Serialize>(&self, ctx: &Context, key: &Key, value: &T) -> StoreResult<Key> {
        let context = || format!("put {key}");
        let props = encode_entity(value).map_err(|e| e.with_context(context()))?;
        self.preflight(ctx, context)?;
        let mut keys = self
            .backend
            .put_multi(ctx, vec![(key.clone(), props)])
            .map_err(|fault| self.translate(fault, context()))?;
        keys.pop()
            .ok_or_else(|| StoreError::backend("backend returned no key", context()))
    }

    fn put_multi<T: Serialize>(&self, ctx: &Context, keys: &[Key], values: &[T]) -> StoreResult<Vec<Key>> {
        let context = || describe_keys("put_multi", keys);
        if keys.len() != values.len() {
            return Err(StoreError::backend(
                format!("{} keys but {} values", keys.len(), values.len()),
                context(),
            ));
        }
        let entries = keys
            .iter()
            .zip(values)
            .map(|(key, value)| {
                encode_entity(value)
                    .map(|props| (key.clone(), props))
                    .map_err(|e| e.with_context(format!("put_multi {key}")))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.preflight(ctx, context)?;
        let stored = self
            .backend
            .put_multi(ctx, entries)
            .map_err(|fault| self.translate(fault, context()))?;
        debug!(count = stored.len(), "put_multi");
        Ok(stored)
    }

    fn delete(&self, ctx: &Context, key: &Key) -> StoreResult<()> {
        let context = || format!("delete {key}");
        self.preflight(ctx, context)?;
        self.backend
            .delete_multi(ctx, std::slice::from_ref(key))
            .map_err(|fault| self.translate(fault, context()))
    }

    fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> StoreResult<()> {
        let context = || describe_keys("delete_multi", keys);
        self.preflight(ctx, context)?;
        self.backend
            .delete_multi(ctx, keys)
            .map_err(|fault| self.translate(fault, context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use serde::Deserialize;
    use stash_types::ErrorKind;
    use std::time::{Duration, Instant};

    const KIND: &str = "test";

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Testobj {
        #[serde(rename = "I")]
        i: i64,
        #[serde(rename = "J")]
        j: i64,
        #[serde(rename = "S")]
        s: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OnlyI {
        #[serde(rename = "I")]
        i: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct NeedsName {
        name: String,
    }

    fn provider() -> BackendProvider<InMemoryBackend> {
        BackendProvider::new(InMemoryBackend::new())
    }

    fn put_objs<P: Provider>(p: &P, ctx: &Context, n: usize) -> (Vec<Testobj>, Vec<Key>) {
        let mut objs = Vec::new();
        let mut keys = Vec::new();
        for i in 0..n {
            let obj = Testobj {
                i: i as i64 * 3,
                ..Default::default()
            };
            let key = p.new_name_key(KIND, &format!("name{i}"), None);
            keys.push(p.put(ctx, &key, &obj).unwrap());
            objs.push(obj);
        }
        (objs, keys)
    }

    fn run_q<P: Provider>(p: &P, ctx: &Context, expected: usize, q: &Query) -> Vec<Testobj> {
        let results: Vec<Testobj> = p
            .get_all(ctx, q)
            .unwrap()
            .into_value()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(results.len(), expected, "query: {q}");
        results
    }

    // -----------------------------------------------------------------------
    // Provider API walkthrough
    // -----------------------------------------------------------------------

    #[test]
    fn provider_api() {
        let ctx = Context::background();
        let p = provider();
        let (objs, keys) = put_objs(&p, &ctx, 3);

        assert_eq!(p.key_parent(&keys[0]), None);
        assert_eq!(p.key_name(&keys[0]), "name0");

        run_q(&p, &ctx, objs.len(), &Query::new(KIND));
        run_q(&p, &ctx, 2, &Query::new(KIND).limit(2));
        run_q(&p, &ctx, 1, &Query::new(KIND).filter("I =", 6));
        let proj = run_q(&p, &ctx, 1, &Query::new(KIND).filter("I =", 6).project(["J"]));
        assert_eq!(proj[0].i, 0, "saw an I value when only J was projected");

        p.delete(&ctx, &keys[0]).unwrap();
        run_q(&p, &ctx, objs.len() - 1, &Query::new(KIND));

        let err = p.get::<Testobj>(&ctx, &keys[0]).unwrap_err();
        assert!(err.is_not_found());

        let results = p.get_multi::<Testobj>(&ctx, &keys[1..]).unwrap();
        assert!(results.is_clean());
        assert_eq!(results.value().len(), 2);

        let multi_keys: Vec<Key> = (0..452)
            .map(|i| p.new_name_key(KIND, &format!("name{}", i + 100), None))
            .collect();
        let multi_objs: Vec<Testobj> = (0..452)
            .map(|i| Testobj {
                i: (100 + i) * 3,
                ..Default::default()
            })
            .collect();
        let stored = p.put_multi(&ctx, &multi_keys, &multi_objs).unwrap();
        assert_eq!(stored.len(), 452);
        run_q(&p, &ctx, 454, &Query::new(KIND));
    }

    #[test]
    fn projection_returns_only_named_fields() {
        let ctx = Context::background();
        let p = provider();
        let key = p.new_name_key(KIND, "full", None);
        p.put(&ctx, &key, &Testobj { i: 6, j: 4, s: "x".into() }).unwrap();

        let rows = run_q(&p, &ctx, 1, &Query::new(KIND).filter("I =", 6).project(["J"]));
        assert_eq!(rows[0].i, 0);
        assert_eq!(rows[0].j, 4);
    }

    #[test]
    fn incomplete_key_is_completed() {
        let ctx = Context::background();
        let p = provider();
        let parent = p.new_name_key("Owner", "o", None);
        let key = p.new_incomplete_key(KIND, Some(&parent));
        let full = p.put(&ctx, &key, &Testobj::default()).unwrap();
        assert!(!full.is_incomplete());
        assert!(full.id().is_some());
        assert_eq!(p.key_parent(&full), Some(parent));
        assert_eq!(p.key_name(&full), "");

        let encoded = full.encode();
        assert_eq!(p.decode_key(&encoded).unwrap(), full);
    }

    // -----------------------------------------------------------------------
    // Error translation
    // -----------------------------------------------------------------------

    #[test]
    fn field_mismatch_is_a_warning() {
        let ctx = Context::background();
        let p = provider();
        let key = p.new_name_key(KIND, "wide", None);
        p.put(&ctx, &key, &Testobj { i: 5, j: 1, s: "s".into() }).unwrap();

        let fetched = p.get::<OnlyI>(&ctx, &key).unwrap();
        assert_eq!(fetched.value(), &OnlyI { i: 5 });
        assert_eq!(fetched.warning_kind(), Some(ErrorKind::FieldMismatch));
        assert!(fetched.strict().unwrap_err().is(ErrorKind::FieldMismatch));
    }

    #[test]
    fn unbuildable_destination_is_type_mismatch() {
        let ctx = Context::background();
        let p = provider();
        let key = p.new_name_key(KIND, "a", None);
        p.put(&ctx, &key, &Testobj::default()).unwrap();
        let err = p.get::<NeedsName>(&ctx, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn get_multi_marks_missing_slots() {
        let ctx = Context::background();
        let p = provider();
        let (_, keys) = put_objs(&p, &ctx, 2);
        let probe = vec![keys[0].clone(), p.new_name_key(KIND, "ghost", None), keys[1].clone()];

        let (values, warning) = p.get_multi::<Testobj>(&ctx, &probe).unwrap().into_parts();
        assert!(values[0].is_some());
        assert!(values[1].is_none());
        assert!(values[2].is_some());
        assert!(warning.unwrap().is_not_found());
    }

    #[test]
    fn delete_missing_is_not_found() {
        let ctx = Context::background();
        let p = provider();
        let err = p.delete(&ctx, &p.new_name_key(KIND, "ghost", None)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn backend_fault_carries_operation_context() {
        let ctx = Context::background();
        let p = provider();
        p.backend().fail_next(BackendFault::Unavailable("connection reset".into()));
        let key = p.new_name_key(KIND, "a", None);
        let err = p.get::<Testobj>(&ctx, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        let text = err.to_string();
        assert!(text.contains("connection reset"), "{text}");
        assert!(text.contains("get /test,\"a\""), "{text}");
    }

    #[test]
    fn query_failure_renders_query() {
        let ctx = Context::background();
        let p = provider();
        let err = p
            .get_all::<Testobj>(&ctx, &Query::new(KIND).filter("I !=", 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("NewQuery(\"test\")"));
    }

    #[test]
    fn expired_context_fails_before_backend() {
        let p = provider();
        let ctx = Context::background().with_deadline(Instant::now() - Duration::from_millis(1));
        let key = p.new_name_key(KIND, "a", None);
        let err = p.put(&ctx, &key, &Testobj::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("deadline exceeded"));
        assert!(p.backend().is_empty());
    }

    #[test]
    fn put_multi_length_mismatch_rejected() {
        let ctx = Context::background();
        let p = provider();
        let keys = vec![p.new_name_key(KIND, "a", None)];
        let err = p
            .put_multi::<Testobj>(&ctx, &keys, &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn keys_only_query_returns_keys() {
        let ctx = Context::background();
        let p = provider();
        let (_, keys) = put_objs(&p, &ctx, 4);
        let found = p.get_all_keys(&ctx, &Query::new(KIND).order("-I")).unwrap();
        let mut expected = keys;
        expected.reverse();
        assert_eq!(found, expected);
    }
}
