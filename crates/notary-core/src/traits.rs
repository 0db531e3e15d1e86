//! Trait interfaces for sealed checkpoints.
//!
//! [`Checkpoint`] is the single capability the block store is written
//! against. Directory blocks and entry blocks both implement it, so the
//! persistence logic (four-entry atomic batch, lookups by hash, sequence and
//! Merkle root) exists once.

use crate::codec;
use crate::constants::{height_key, Table};
use crate::error::CoreError;
use crate::types::{sha256, Hash256};

/// Tables a checkpoint variant is indexed into.
///
/// The chain-head table is shared by every variant and keyed by chain id, so
/// it is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointTables {
    /// Content hash → serialized block.
    pub blocks: Table,
    /// Sequence key → content hash.
    pub by_sequence: Table,
    /// Key Merkle root → content hash.
    pub by_merkle_root: Table,
}

/// A sealed, hash-identified block that can be persisted and anchored.
///
/// Both identifiers are pure functions of the block's encoded content, so a
/// block never carries an "unset" hash: whoever needs one derives it.
pub trait Checkpoint:
    bincode::Encode + bincode::Decode<()> + Clone + Send + Sync + 'static
{
    /// Short name used in logs and codec errors.
    const KIND: &'static str;

    /// Index tables for this variant.
    const TABLES: CheckpointTables;

    /// Whether inserting this variant advances the store's height cache.
    const TRACKS_HEIGHT: bool = false;

    /// Height within the block's own chain.
    fn height(&self) -> u64;

    /// Chain id whose head this block becomes.
    fn chain_id(&self) -> Hash256;

    /// Key Merkle root over the block's header and body.
    fn key_merkle_root(&self) -> Hash256;

    /// Sequence-index key for `height` on `chain_id`.
    ///
    /// Defaults to the big-endian height alone, which is correct for
    /// variants with a single chain.
    fn sequence_key_at(_chain_id: &Hash256, height: u64) -> Vec<u8> {
        height_key(height).to_vec()
    }

    /// Sequence-index key of this block.
    fn sequence_key(&self) -> Vec<u8> {
        Self::sequence_key_at(&self.chain_id(), self.height())
    }

    /// Canonical serialization.
    fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        codec::encode(Self::KIND, self)
    }

    /// Strict inverse of [`to_bytes`](Self::to_bytes).
    fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        codec::decode(Self::KIND, bytes)
    }

    /// Content hash (`SHA256(to_bytes(self))`).
    fn content_hash(&self) -> Result<Hash256, CoreError> {
        Ok(sha256(&self.to_bytes()?))
    }
}
