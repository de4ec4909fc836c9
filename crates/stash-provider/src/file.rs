//! File-backed backend.
//!
//! [`FileBackend`] keeps its entities in an [`InMemoryBackend`] and rewrites
//! a JSON snapshot of them after every successful mutation. The snapshot is
//! written to a sibling temporary file first and then renamed into place, so
//! a crash mid-write leaves the previous snapshot intact. A mutation whose
//! snapshot cannot be written is rolled back in memory too.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use stash_types::{Context, Key, Properties, Query};
use tracing::{debug, warn};

use crate::error::{BackendFault, BackendResult};
use crate::memory::{InMemoryBackend, Snapshot};
use crate::traits::Backend;

/// Single-file JSON snapshot [`Backend`].
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: InMemoryBackend,
    writes: Mutex<()>,
}

impl FileBackend {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let data = fs::read(&path).map_err(|e| {
                BackendFault::Unavailable(format!("reading {}: {e}", path.display()))
            })?;
            let snapshot: Snapshot = serde_json::from_slice(&data).map_err(|e| {
                BackendFault::Other(format!("corrupt snapshot {}: {e}", path.display()))
            })?;
            debug!(path = %path.display(), entities = snapshot.entities.len(), "loaded snapshot");
            InMemoryBackend::from_snapshot(snapshot)
        } else {
            InMemoryBackend::new()
        };
        Ok(Self {
            path,
            inner,
            writes: Mutex::new(()),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Apply `mutate` and write the result to disk, or undo it if the
    /// snapshot cannot be written. `NoSuchEntity` from a partial delete still
    /// changed the contents, so it is persisted and then returned.
    fn commit<T>(&self, mutate: impl FnOnce(&InMemoryBackend) -> BackendResult<T>) -> BackendResult<T> {
        let _guard = self.writes.lock().expect("lock poisoned");
        let before = self.inner.snapshot();
        let result = mutate(&self.inner);
        if matches!(&result, Err(fault) if !matches!(fault, BackendFault::NoSuchEntity)) {
            return result;
        }
        if let Err(fault) = self.persist() {
            warn!(path = %self.path.display(), error = %fault, "snapshot write failed; rolling back");
            self.inner.restore(before);
            return Err(fault);
        }
        result
    }

    fn persist(&self) -> BackendResult<()> {
        let data = serde_json::to_vec_pretty(&self.inner.snapshot())
            .map_err(|e| BackendFault::Other(format!("encoding snapshot: {e}")))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                BackendFault::Unavailable(format!("creating {}: {e}", dir.display()))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data)
            .map_err(|e| BackendFault::Unavailable(format!("writing {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            BackendFault::Unavailable(format!("renaming into {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), bytes = data.len(), "wrote snapshot");
        Ok(())
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, ctx: &Context, key: &Key) -> BackendResult<Properties> {
        self.inner.get(ctx, key)
    }

    fn get_multi(&self, ctx: &Context, keys: &[Key]) -> BackendResult<Vec<Option<Properties>>> {
        self.inner.get_multi(ctx, keys)
    }

    fn put_multi(&self, ctx: &Context, entries: Vec<(Key, Properties)>) -> BackendResult<Vec<Key>> {
        self.commit(|inner| inner.put_multi(ctx, entries))
    }

    fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> BackendResult<()> {
        self.commit(|inner| inner.delete_multi(ctx, keys))
    }

    fn run_query(&self, ctx: &Context, query: &Query) -> BackendResult<Vec<(Key, Properties)>> {
        self.inner.run_query(ctx, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn props(i: i64) -> Properties {
        let mut p = Properties::new();
        p.insert("I".into(), json!(i));
        p
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path().join("db.json")).unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let ctx = Context::background();
        let key = Key::named("T", "a", None);
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put_multi(&ctx, vec![(key.clone(), props(7))]).unwrap();
        }
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.get(&ctx, &key).unwrap(), props(7));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn delete_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let ctx = Context::background();
        let key = Key::named("T", "a", None);
        let backend = FileBackend::open(&path).unwrap();
        backend.put_multi(&ctx, vec![(key.clone(), props(1))]).unwrap();
        backend.delete_multi(&ctx, &[key]).unwrap();
        assert!(FileBackend::open(&path).unwrap().is_empty());
    }

    #[test]
    fn failed_put_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file, not a directory").unwrap();
        let ctx = Context::background();
        let key = Key::named("T", "a", None);

        let backend = FileBackend::open(blocker.join("db.json")).unwrap();
        let err = backend
            .put_multi(&ctx, vec![(key.clone(), props(1))])
            .unwrap_err();
        assert!(matches!(err, BackendFault::Unavailable(_)));
        assert!(backend.is_empty());
        assert_eq!(backend.get(&ctx, &key), Err(BackendFault::NoSuchEntity));
        assert!(backend.run_query(&ctx, &Query::new("T")).unwrap().is_empty());
    }

    #[test]
    fn failed_incomplete_put_does_not_burn_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let ctx = Context::background();
        let backend = FileBackend::open(&path).unwrap();
        let first = backend
            .put_multi(&ctx, vec![(Key::incomplete("T", None), props(1))])
            .unwrap();

        fs::create_dir(path.with_extension("tmp")).unwrap();
        assert!(backend
            .put_multi(&ctx, vec![(Key::incomplete("T", None), props(2))])
            .is_err());
        fs::remove_dir(path.with_extension("tmp")).unwrap();

        let second = backend
            .put_multi(&ctx, vec![(Key::incomplete("T", None), props(3))])
            .unwrap();
        assert_eq!(second[0].id(), first[0].id().map(|id| id + 1));
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn failed_delete_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let ctx = Context::background();
        let key = Key::named("T", "a", None);
        let backend = FileBackend::open(&path).unwrap();
        backend.put_multi(&ctx, vec![(key.clone(), props(1))]).unwrap();

        // A directory where the temporary snapshot goes makes the write fail.
        fs::create_dir(path.with_extension("tmp")).unwrap();
        assert!(backend.delete_multi(&ctx, &[key.clone()]).is_err());
        assert_eq!(backend.get(&ctx, &key).unwrap(), props(1));
        assert_eq!(FileBackend::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, b"{not json").unwrap();
        let err = FileBackend::open(&path).unwrap_err();
        assert!(matches!(err, BackendFault::Other(_)));
    }
}
