//! Row/field on-demand accessor with LRU caching over a [`Store`] (§4.11).
//!
//! `LazyView` owns the `Store` it wraps (1:1 parser↔store, per the
//! ownership summary) so destroying the view also frees the parsed
//! bytes. The header-extraction bug documented for re-implementation —
//! a Row proxy re-entering the field getter and deadlocking across an
//! FFI boundary — is avoided here architecturally: the header is read
//! directly off the `Store` during construction into a small owned
//! array, never through `RowView`.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::error::{ErrorKind, OcsvError};
use crate::store::{RowView, Store};

const MAX_CACHED_ROWS: usize = 1024;

pub struct LazyView {
    store: Store,
    row_offset: usize,
    header: Vec<Vec<u8>>,
    /// Tracks which rows have been "materialised" and their recency.
    /// The underlying `Store` field access is already O(1) slice
    /// indexing, so there is no expensive Row object to actually cache;
    /// this bounds memory the way a real materialised-Row cache would,
    /// and gives `get_row` the documented LRU-eviction behaviour.
    cache: LruCache<usize, ()>,
    destroyed: bool,
}

impl LazyView {
    /// `has_header` selects `row_offset`: 1 if the first row is a header
    /// consumed eagerly here, 0 otherwise.
    pub fn new(store: Store, has_header: bool) -> Self {
        let row_offset = if has_header && store.row_count() > 0 {
            1
        } else {
            0
        };
        let header = if row_offset == 1 {
            store
                .row(0)
                .map(|r| r.fields().map(|f| f.to_vec()).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Self {
            store,
            row_offset,
            header,
            cache: LruCache::new(NonZeroUsize::new(MAX_CACHED_ROWS).unwrap()),
            destroyed: false,
        }
    }

    pub fn header(&self) -> &[Vec<u8>] {
        &self.header
    }

    pub fn row_count(&self) -> usize {
        self.store.row_count().saturating_sub(self.row_offset)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Number of rows currently tracked in the LRU (test/diagnostic hook).
    pub fn cached_row_count(&self) -> usize {
        self.cache.len()
    }

    /// Fetches row `i` (0-based, after the header offset). Marks it
    /// most-recently-used, evicting the least-recently-used entry once
    /// more than [`MAX_CACHED_ROWS`] rows have been touched.
    pub fn get_row(&mut self, i: usize) -> Result<RowView<'_>, OcsvError> {
        if self.destroyed {
            return Err(OcsvError::api(
                ErrorKind::UseAfterDestroy,
                "get_row called after LazyView was destroyed",
            ));
        }
        let actual = i + self.row_offset;
        if actual >= self.store.row_count() {
            return Err(OcsvError::api(
                ErrorKind::OutOfRange,
                format!("row index {i} out of range"),
            ));
        }
        self.cache.put(actual, ());
        Ok(self
            .store
            .row(actual)
            .expect("bounds already checked above"))
    }

    /// Invalidates all outstanding row accesses and frees the `Store`.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.cache.clear();
        self.store.clear();
    }
}
