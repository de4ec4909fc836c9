//! Paginated, batching query iterator.
//!
//! A [`BatchIterator`] runs its query once, keys-only, when it is built, and
//! then fetches full values a page at a time with one `get_multi` per page.
//! No backend cursor is held open, so a slow consumer never sees a cursor
//! time out; the price is memory proportional to the number of matching
//! keys.
//!
//! ```ignore
//! let mut it = BatchIterator::<_, Flight>::new(&ctx, &provider, &query).with_page_size(100);
//! while it.advance(&ctx) {
//!     let (key, flight) = it.current().unwrap();
//!     println!("{key}: {flight:?}");
//! }
//! if let Some(err) = it.err() {
//!     return Err(err.clone());
//! }
//! ```

use std::collections::VecDeque;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stash_types::{Context, ErrorKind, Key, Query, StoreError, DEFAULT_PAGE_SIZE};
use tracing::debug;

use crate::traits::Provider;

/// Single-pass, single-consumer iterator over the results of a query.
pub struct BatchIterator<'p, P, T> {
    provider: &'p P,
    page_size: usize,
    pending: VecDeque<Key>,
    page: VecDeque<(Key, T)>,
    current: Option<(Key, T)>,
    err: Option<StoreError>,
    _value: PhantomData<fn() -> T>,
}

impl<'p, P, T> BatchIterator<'p, P, T>
where
    P: Provider,
    T: Serialize + DeserializeOwned,
{
    /// Run `query` keys-only and capture the ordered key list.
    ///
    /// A failure here is not returned; it becomes the iterator's terminal
    /// error and the first [`advance`](Self::advance) returns `false`.
    pub fn new(ctx: &Context, provider: &'p P, query: &Query) -> Self {
        let (pending, err) = match provider.get_all_keys(ctx, query) {
            Ok(keys) => (keys.into(), None),
            Err(e) => (VecDeque::new(), Some(e.with_context("iterator key scan"))),
        };
        Self {
            provider,
            page_size: DEFAULT_PAGE_SIZE,
            pending,
            page: VecDeque::new(),
            current: None,
            err,
            _value: PhantomData,
        }
    }

    /// Set the number of values fetched per page.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        assert!(page_size > 0, "iterator page size must be positive");
        self.page_size = page_size;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Move to the next item, fetching a new page if the current one is
    /// used up. Returns `false` when iteration is over, either because the
    /// results are exhausted or because a terminal error was hit.
    pub fn advance(&mut self, ctx: &Context) -> bool {
        if self.err.is_some() {
            self.current = None;
            return false;
        }
        if self.page.is_empty() {
            if self.pending.is_empty() {
                self.current = None;
                return false;
            }
            if !self.fetch_page(ctx) {
                self.current = None;
                return false;
            }
        }
        self.current = self.page.pop_front();
        self.current.is_some()
    }

    fn fetch_page(&mut self, ctx: &Context) -> bool {
        let take = self.page_size.min(self.pending.len());
        let keys: Vec<Key> = self.pending.drain(..take).collect();
        debug!(page = keys.len(), remaining = self.pending.len(), "fetching iterator page");

        let (values, warning) = match self.provider.get_multi::<T>(ctx, &keys) {
            Ok(fetched) => fetched.into_parts(),
            Err(e) => {
                self.err = Some(e.with_context("fetching iterator page"));
                return false;
            }
        };
        // Entities deleted since the key scan end iteration; dropped fields
        // do not.
        if let Some(w) = warning.filter(|w| w.is(ErrorKind::NotFound)) {
            self.err = Some(w.with_context("fetching iterator page"));
            return false;
        }
        self.page = keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();
        true
    }

    /// The item most recently produced by [`advance`](Self::advance).
    pub fn current(&self) -> Option<(&Key, &T)> {
        self.current.as_ref().map(|(k, v)| (k, v))
    }

    /// Take ownership of the current item.
    pub fn take_current(&mut self) -> Option<(Key, T)> {
        self.current.take()
    }

    /// Items not yet handed out: unfetched keys plus the rest of the page.
    pub fn remaining(&self) -> usize {
        self.pending.len() + self.page.len()
    }

    /// Returns `true` while items remain and no terminal error has been hit.
    pub fn has_more(&self) -> bool {
        self.err.is_none() && self.remaining() > 0
    }

    /// The terminal error, if iteration stopped on one.
    pub fn err(&self) -> Option<&StoreError> {
        self.err.as_ref()
    }

    /// Force iteration to stop with `err`.
    pub fn set_err(&mut self, err: StoreError) {
        self.err = Some(err);
    }
}

impl<P, T> std::fmt::Debug for BatchIterator<'_, P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchIterator")
            .field("page_size", &self.page_size)
            .field("pending", &self.pending.len())
            .field("page", &self.page.len())
            .field("err", &self.err)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendFault;
    use crate::memory::InMemoryBackend;
    use crate::provider::BackendProvider;
    use serde::Deserialize;
    use std::collections::HashSet;

    const KIND: &str = "test";
    const N: usize = 11;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Testobj {
        #[serde(rename = "I")]
        i: i64,
        #[serde(rename = "S")]
        s: String,
    }

    fn seeded(n: usize) -> BackendProvider<InMemoryBackend> {
        let ctx = Context::background();
        let p = BackendProvider::new(InMemoryBackend::new());
        // Names sort opposite to I so ordering tests cannot pass by accident.
        for i in 0..n {
            let key = p.new_name_key(KIND, &format!("name{:02}", n - i), None);
            p.put(&ctx, &key, &Testobj { i: i as i64 * 3, s: String::new() })
                .unwrap();
        }
        p
    }

    fn drain(it: &mut BatchIterator<'_, BackendProvider<InMemoryBackend>, Testobj>) -> Vec<(Key, Testobj)> {
        let ctx = Context::background();
        let mut out = Vec::new();
        while it.advance(&ctx) {
            let (k, v) = it.current().unwrap();
            out.push((k.clone(), v.clone()));
        }
        out
    }

    // -----------------------------------------------------------------------
    // Completeness and ordering
    // -----------------------------------------------------------------------

    #[test]
    fn every_page_size_yields_each_item_once() {
        let p = seeded(N);
        let ctx = Context::background();
        for page_size in [3, 1, N, N + 1, 2 * N] {
            let mut it = BatchIterator::new(&ctx, &p, &Query::new(KIND)).with_page_size(page_size);
            assert_eq!(it.remaining(), N);
            let items = drain(&mut it);
            assert!(it.err().is_none(), "page size {page_size}: {:?}", it.err());
            assert_eq!(items.len(), N, "page size {page_size}");
            let distinct: HashSet<Key> = items.iter().map(|(k, _)| k.clone()).collect();
            assert_eq!(distinct.len(), N, "page size {page_size}");
            assert_eq!(it.remaining(), 0);
            assert!(!it.has_more());
        }
    }

    #[test]
    fn ascending_order_is_preserved() {
        let p = seeded(N);
        let ctx = Context::background();
        let mut it = BatchIterator::new(&ctx, &p, &Query::new(KIND).order("I")).with_page_size(3);
        let values: Vec<i64> = drain(&mut it).into_iter().map(|(_, v)| v.i).collect();
        let expected: Vec<i64> = (0..N as i64).map(|i| i * 3).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn descending_order_is_preserved() {
        let p = seeded(N);
        let ctx = Context::background();
        let mut it = BatchIterator::new(&ctx, &p, &Query::new(KIND).order("-I")).with_page_size(4);
        let values: Vec<i64> = drain(&mut it).into_iter().map(|(_, v)| v.i).collect();
        let expected: Vec<i64> = (0..N as i64).rev().map(|i| i * 3).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn remaining_counts_page_and_pending() {
        let p = seeded(5);
        let ctx = Context::background();
        let mut it = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND)).with_page_size(2);
        assert_eq!(it.remaining(), 5);
        assert!(it.advance(&ctx));
        assert_eq!(it.remaining(), 4);
        assert!(it.take_current().is_some());
        assert!(it.current().is_none());
    }

    #[test]
    fn empty_result_set() {
        let p = seeded(0);
        let ctx = Context::background();
        let mut it = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND));
        assert!(!it.has_more());
        assert!(!it.advance(&ctx));
        assert!(it.err().is_none());
    }

    #[test]
    #[should_panic(expected = "page size must be positive")]
    fn zero_page_size_panics() {
        let p = seeded(1);
        let ctx = Context::background();
        let _ = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND)).with_page_size(0);
    }

    // -----------------------------------------------------------------------
    // Terminal errors
    // -----------------------------------------------------------------------

    #[test]
    fn failed_key_scan_is_terminal() {
        let p = seeded(3);
        let ctx = Context::background();
        p.backend().fail_next(BackendFault::Unavailable("down".into()));
        let mut it = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND));
        assert!(!it.has_more());
        assert!(!it.advance(&ctx));
        assert_eq!(it.err().map(StoreError::kind), Some(ErrorKind::Backend));
    }

    #[test]
    fn page_failure_keeps_consumed_items() {
        let p = seeded(6);
        let ctx = Context::background();
        let mut it = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND)).with_page_size(3);
        let mut seen = 0;
        for _ in 0..3 {
            assert!(it.advance(&ctx));
            seen += 1;
        }
        p.backend().fail_next(BackendFault::DeadlineExceeded);
        assert!(!it.advance(&ctx));
        assert_eq!(seen, 3);
        assert_eq!(it.err().map(StoreError::kind), Some(ErrorKind::Backend));
        assert!(!it.has_more());
        assert!(!it.advance(&ctx));
    }

    #[test]
    fn entity_deleted_after_scan_is_terminal_not_found() {
        let p = seeded(4);
        let ctx = Context::background();
        let mut it = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND)).with_page_size(2);
        let last = p.backend().all_keys().pop().unwrap();
        p.delete(&ctx, &last).unwrap();

        assert!(it.advance(&ctx));
        assert!(it.advance(&ctx));
        assert!(!it.advance(&ctx));
        assert!(it.err().unwrap().is_not_found());
    }

    #[test]
    fn set_err_stops_iteration() {
        let p = seeded(3);
        let ctx = Context::background();
        let mut it = BatchIterator::<_, Testobj>::new(&ctx, &p, &Query::new(KIND));
        assert!(it.advance(&ctx));
        it.set_err(StoreError::backend("wrapper gave up", ""));
        assert!(!it.has_more());
        assert!(!it.advance(&ctx));
        assert!(it.err().is_some());
    }
}
