//! Lazy iterators over stored tables.
//!
//! Both iterators hold the store's shared lock for as long as they live, so no
//! block insert can commit mid-iteration. Drop them promptly: a long-lived
//! scan stalls writers.

use parking_lot::RwLockReadGuard;

use notary_core::constants::{height_key, Table};
use notary_core::{Hash256, StoreError};

use crate::backend::{KvBackend, KvIter};
use crate::cache::HeightCache;
use crate::store::read_hash;

/// Upper end of a height range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnd {
    /// Stop before this height.
    Bounded(u64),
    /// Continue until the first height with no stored block.
    Unbounded,
}

impl From<Option<u64>> for RangeEnd {
    fn from(end: Option<u64>) -> Self {
        end.map_or(RangeEnd::Unbounded, RangeEnd::Bounded)
    }
}

/// Directory block hashes for consecutive heights, ascending.
///
/// Ends at the range bound or at the first missing height, whichever comes
/// first. A gap is not an error. [`restart`](Self::restart) rewinds to the
/// start height.
pub struct HeightRange<'a, K: KvBackend> {
    backend: &'a K,
    start: u64,
    next: u64,
    end: RangeEnd,
    done: bool,
    _guard: RwLockReadGuard<'a, HeightCache>,
}

impl<'a, K: KvBackend> HeightRange<'a, K> {
    pub(crate) fn new(
        backend: &'a K,
        guard: RwLockReadGuard<'a, HeightCache>,
        start: u64,
        end: RangeEnd,
    ) -> Self {
        Self {
            backend,
            start,
            next: start,
            end,
            done: false,
            _guard: guard,
        }
    }

    /// Rewind to the first height of the range.
    pub fn restart(&mut self) {
        self.next = self.start;
        self.done = false;
    }
}

impl<K: KvBackend> Iterator for HeightRange<'_, K> {
    type Item = Result<Hash256, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let RangeEnd::Bounded(end) = self.end {
            if self.next >= end {
                self.done = true;
                return None;
            }
        }
        match read_hash(self.backend, Table::DirBlockHeight, &height_key(self.next)) {
            Ok(Some(hash)) => {
                match self.next.checked_add(1) {
                    Some(n) => self.next = n,
                    None => self.done = true,
                }
                Some(Ok(hash))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Every `(key, value)` of one table, table tag stripped from the key.
pub struct TableScan<'a> {
    inner: KvIter<'a>,
    _guard: RwLockReadGuard<'a, HeightCache>,
}

impl<'a> TableScan<'a> {
    pub(crate) fn new<K: KvBackend>(
        backend: &'a K,
        guard: RwLockReadGuard<'a, HeightCache>,
        table: Table,
    ) -> Self {
        let (start, end) = table.bounds();
        Self {
            inner: backend.range(&start, &end),
            _guard: guard,
        }
    }
}

impl Iterator for TableScan<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|item| item.map(|(key, value)| (key[1..].to_vec(), value)))
    }
}
