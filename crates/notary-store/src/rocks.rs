//! RocksDB-backed [`KvBackend`].
//!
//! All tables share the default column family; every key carries its
//! single-byte table tag, so a table is one contiguous key range. Range
//! iterators read from the implicit snapshot RocksDB pins when the iterator
//! is created.

use std::path::Path;

use rocksdb::{Direction, IteratorMode, Options, ReadOptions, DB};

use notary_core::StoreError;

use crate::backend::{KvBackend, KvIter, WriteBatch};

fn backend_err(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// RocksDB database holding the block tables.
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref()).map_err(backend_err)?;
        Ok(Self { db })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(backend_err)
    }
}

impl KvBackend for RocksBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key).map_err(backend_err)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut wb = rocksdb::WriteBatch::default();
        for (key, value) in batch.into_puts() {
            wb.put(key, value);
        }
        self.db.write(wb).map_err(backend_err)
    }

    fn range<'a>(&'a self, start: &[u8], end: &[u8]) -> KvIter<'a> {
        let mut opts = ReadOptions::default();
        opts.set_iterate_upper_bound(end.to_vec());
        let iter = self
            .db
            .iterator_opt(IteratorMode::From(start, Direction::Forward), opts);
        Box::new(iter.map(|item| {
            item.map(|(k, v)| (k.into_vec(), v.into_vec()))
                .map_err(backend_err)
        }))
    }

    fn last(&self, start: &[u8], end: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut opts = ReadOptions::default();
        opts.set_iterate_lower_bound(start.to_vec());
        opts.set_iterate_upper_bound(end.to_vec());
        let mut iter = self.db.iterator_opt(IteratorMode::End, opts);
        match iter.next() {
            Some(Ok((k, v))) => Ok(Some((k.into_vec(), v.into_vec()))),
            Some(Err(e)) => Err(backend_err(e)),
            None => Ok(None),
        }
    }
}
