//! The directory block being accumulated for the next seal.

use notary_core::constants::DIR_BLOCK_VERSION;
use notary_core::{Checkpoint, CoreError, DirBlockHeader, DirEntry, DirectoryBlock, Hash256};

/// Entries collected since the last sealed directory block.
///
/// Each chain contributes at most one entry per interval; committing a newer
/// entry block for the same chain replaces its key Merkle root in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDirBlock {
    height: u64,
    prev_key_mr: Hash256,
    prev_hash: Hash256,
    opened_at: u64,
    entries: Vec<DirEntry>,
}

impl PendingDirBlock {
    /// First directory block of a new chain.
    pub fn genesis(opened_at: u64) -> Self {
        Self {
            height: 0,
            prev_key_mr: Hash256::ZERO,
            prev_hash: Hash256::ZERO,
            opened_at,
            entries: Vec::new(),
        }
    }

    /// The block following `tip`, whose content hash is `tip_hash`.
    pub fn after(tip: &DirectoryBlock, tip_hash: Hash256, opened_at: u64) -> Self {
        Self {
            height: tip.height() + 1,
            prev_key_mr: tip.key_merkle_root(),
            prev_hash: tip_hash,
            opened_at,
            entries: Vec::new(),
        }
    }

    /// Height the block will have once sealed.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Record `entry`, replacing any earlier entry for the same chain.
    pub fn add(&mut self, entry: DirEntry) {
        match self.entries.iter_mut().find(|e| e.chain_id == entry.chain_id) {
            Some(existing) => existing.key_mr = entry.key_mr,
            None => self.entries.push(entry),
        }
    }

    /// The sealed form of the current contents.
    pub fn build(&self, network_id: u32) -> Result<DirectoryBlock, CoreError> {
        DirectoryBlock::new(
            DirBlockHeader {
                version: DIR_BLOCK_VERSION,
                network_id,
                prev_key_mr: self.prev_key_mr,
                prev_hash: self.prev_hash,
                timestamp: self.opened_at,
                height: self.height,
                entry_count: 0,
            },
            self.entries.clone(),
        )
    }
}
