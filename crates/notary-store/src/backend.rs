//! Ordered key-value backend contract.
//!
//! The block store needs four things from its backend: point reads, atomic
//! all-or-nothing batch writes, and ordered range iteration over a
//! consistent view. [`RocksBackend`](crate::rocks::RocksBackend) provides them
//! on disk; [`MemoryBackend`] provides them in memory for tests and tooling.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use notary_core::StoreError;

/// Ordered `(key, value)` iterator over one key range.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'a>;

/// Pending set of writes applied atomically by [`KvBackend::write`].
///
/// A batch is a plain value: created for one transaction, consumed by the
/// write, never shared.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `key → value`. Later puts to the same key win.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.puts.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    /// Staged writes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.puts.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn into_puts(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.puts
    }
}

/// Storage engine behind a [`BlockStore`](crate::store::BlockStore).
pub trait KvBackend: Send + Sync {
    /// Read one key. `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply every write in `batch`, or none of them.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Iterate `[start, end)` in ascending key order over a view that does not
    /// change while the iterator is alive.
    fn range<'a>(&'a self, start: &[u8], end: &[u8]) -> KvIter<'a>;

    /// Highest-keyed entry in `[start, end)`.
    fn last(&self, start: &[u8], end: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// In-memory [`KvBackend`] over a `BTreeMap`.
///
/// Range iteration copies the requested range up front, which gives the same
/// point-in-time view a RocksDB iterator gets from its implicit snapshot.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent [`write`](KvBackend::write) fail without
    /// applying anything.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of batches successfully applied.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored keys across all tables.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Overwrite one key outside any batch. Used to plant corrupt values.
    pub fn put_raw(&self, key: Vec<u8>, value: Vec<u8>) {
        self.map.write().insert(key, value);
    }

    /// Independent backend holding a copy of the current contents, as a
    /// reopened database would.
    pub fn fork(&self) -> Self {
        Self {
            map: RwLock::new(self.map.read().clone()),
            ..Self::default()
        }
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        let mut map = self.map.write();
        for (key, value) in batch.into_puts() {
            map.insert(key, value);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn range<'a>(&'a self, start: &[u8], end: &[u8]) -> KvIter<'a> {
        if start >= end {
            return Box::new(std::iter::empty());
        }
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self
            .map
            .read()
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(snapshot.into_iter().map(Ok))
    }

    fn last(&self, start: &[u8], end: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        if start >= end {
            return Ok(None);
        }
        Ok(self
            .map
            .read()
            .range(start.to_vec()..end.to_vec())
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }
}
