//! Shared builders and fakes for the integration tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use bitcoin::Amount;
use notary_anchor::{hash_to_txid, AnchorError, AnchorReceipt, CommitmentAnchor, TxStatus};
use notary_core::constants::DIR_BLOCK_VERSION;
use notary_core::types::sha256;
use notary_core::{Checkpoint, DirBlockHeader, DirEntry, DirectoryBlock, Hash256};

/// Hash with every byte set to `seed`.
pub fn h(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// `count` distinct entries derived from `seed`.
pub fn entries(seed: u64, count: usize) -> Vec<DirEntry> {
    (0..count)
        .map(|i| DirEntry {
            chain_id: sha256(&[seed.to_be_bytes(), (i as u64).to_be_bytes()].concat()),
            key_mr: sha256(&[(i as u64).to_be_bytes(), seed.to_be_bytes()].concat()),
        })
        .collect()
}

/// A directory block at `height` with `count` entries and no parent link.
pub fn dir_block(height: u64, count: usize) -> DirectoryBlock {
    DirectoryBlock::new(
        DirBlockHeader {
            version: DIR_BLOCK_VERSION,
            network_id: 0,
            prev_key_mr: Hash256::ZERO,
            prev_hash: Hash256::ZERO,
            timestamp: 1_700_000_000 + height,
            height,
            entry_count: 0,
        },
        entries(height, count),
    )
    .expect("entry count fits the header")
}

/// `len` linked directory blocks starting at height 0.
pub fn dir_chain(len: u64) -> Vec<DirectoryBlock> {
    let mut blocks: Vec<DirectoryBlock> = Vec::new();
    for height in 0..len {
        let mut block = dir_block(height, 1 + (height % 3) as usize);
        if let Some(prev) = blocks.last() {
            block.header.prev_key_mr = prev.key_merkle_root();
            block.header.prev_hash = prev.content_hash().unwrap_or(Hash256::ZERO);
        }
        blocks.push(block);
    }
    blocks
}

/// Anchor that never touches a network. Counts calls and can be told to
/// fail or to report a confirmation depth.
#[derive(Debug, Default)]
pub struct CountingAnchor {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub confirmations: AtomicU32,
}

impl CountingAnchor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_confirmations(&self, confirmations: u32) {
        self.confirmations.store(confirmations, Ordering::SeqCst);
    }
}

impl CommitmentAnchor for CountingAnchor {
    fn anchor(&self, commitment: &Hash256) -> Result<AnchorReceipt, AnchorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AnchorError::InsufficientFunds { have: 0, need: 10_000 });
        }
        Ok(AnchorReceipt {
            txid: hash_to_txid(&sha256(commitment.as_bytes())),
            commitment: *commitment,
            inputs: 1,
            fee: Amount::from_sat(10_000),
            change: Amount::ZERO,
        })
    }

    fn status(&self, _tx_hash: &Hash256) -> Result<TxStatus, AnchorError> {
        Ok(TxStatus {
            confirmations: self.confirmations.load(Ordering::SeqCst),
            block_hash: None,
            block_height: Some(2_500_000),
        })
    }
}
