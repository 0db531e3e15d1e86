//! # notary-core
//! Foundation types and traits for the Notary checkpoint chain.
//!
//! - [`types`] — `Hash256` and SHA-256 helpers
//! - [`block`] — directory blocks, entry blocks, and anchor records
//! - [`traits`] — the [`Checkpoint`](traits::Checkpoint) capability shared by sealed blocks
//! - [`merkle`] — SHA-256 Merkle roots
//! - [`codec`] — canonical bincode encoding with strict decoding
//! - [`constants`] — key-schema table tags and well-known chain ids

pub mod block;
pub mod codec;
pub mod constants;
pub mod error;
pub mod merkle;
pub mod traits;
pub mod types;

pub use block::{DirBlockHeader, DirBlockInfo, DirEntry, DirectoryBlock, EntryBlock, EntryBlockHeader};
pub use error::{CoreError, StoreError};
pub use traits::{Checkpoint, CheckpointTables};
pub use types::Hash256;
