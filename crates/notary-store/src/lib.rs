//! # notary-store
//! Persistence for directory blocks, entry blocks, and anchor records.
//!
//! - [`backend`] — the ordered key-value contract and an in-memory backend
//! - [`rocks`] — RocksDB backend
//! - [`store`] — [`BlockStore`] and its write transactions
//! - [`scan`] — lazy height ranges and table scans
//! - [`cache`] — the process-local height cache

pub mod backend;
pub mod cache;
pub mod rocks;
pub mod scan;
pub mod store;

pub use backend::{KvBackend, MemoryBackend, WriteBatch};
pub use cache::HeightCache;
pub use rocks::RocksBackend;
pub use scan::{HeightRange, RangeEnd, TableScan};
pub use store::{BlockStore, StoreTxn};
