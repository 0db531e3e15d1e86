//! Directory blocks, entry blocks, and anchor records.
//!
//! A [`DirectoryBlock`] is the periodic checkpoint that gets anchored. Its
//! body lists, per chain, the key Merkle root of the [`EntryBlock`] sealed for
//! that chain during the interval. A [`DirBlockInfo`] links a persisted
//! directory block to the Bitcoin transaction that anchors it.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::constants::{height_key, Table, DIRECTORY_CHAIN_ID};
use crate::error::CoreError;
use crate::merkle::{merkle_root, node_hash};
use crate::traits::{Checkpoint, CheckpointTables};
use crate::types::{sha256, sha256_concat, Hash256};

/// Directory block header.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DirBlockHeader {
    /// Header format version.
    pub version: u8,
    /// Network the block belongs to.
    pub network_id: u32,
    /// Key Merkle root of the previous directory block (zero at genesis).
    pub prev_key_mr: Hash256,
    /// Content hash of the previous directory block (zero at genesis).
    pub prev_hash: Hash256,
    /// Unix timestamp in seconds at which the interval opened.
    pub timestamp: u64,
    /// Directory chain height, contiguous from 0.
    pub height: u64,
    /// Number of entries in the body.
    pub entry_count: u32,
}

impl DirBlockHeader {
    /// SHA-256 of the canonical header encoding.
    pub fn hash(&self) -> Result<Hash256, CoreError> {
        Ok(sha256(&codec::encode("directory block header", self)?))
    }
}

/// One body entry: a chain and the key Merkle root of its latest entry block.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DirEntry {
    pub chain_id: Hash256,
    pub key_mr: Hash256,
}

impl DirEntry {
    /// Merkle leaf for this entry: `SHA256(chain_id || key_mr)`.
    pub fn leaf(&self) -> Hash256 {
        sha256_concat(&[self.chain_id.as_bytes(), self.key_mr.as_bytes()])
    }
}

/// Header `entry_count` for a body of `len` entries.
pub(crate) fn entry_count(len: usize) -> Result<u32, CoreError> {
    u32::try_from(len).map_err(|_| CoreError::TooManyEntries(len))
}

/// A sealed directory block.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DirectoryBlock {
    pub header: DirBlockHeader,
    pub entries: Vec<DirEntry>,
}

impl DirectoryBlock {
    /// Build a block, deriving `entry_count` from `entries`.
    pub fn new(mut header: DirBlockHeader, entries: Vec<DirEntry>) -> Result<Self, CoreError> {
        header.entry_count = entry_count(entries.len())?;
        Ok(Self { header, entries })
    }

    /// Merkle root over the body entries.
    pub fn body_merkle_root(&self) -> Hash256 {
        let leaves: Vec<Hash256> = self.entries.iter().map(DirEntry::leaf).collect();
        merkle_root(&leaves)
    }

    /// Whether the body has no entries. Empty blocks are never sealed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Checkpoint for DirectoryBlock {
    const KIND: &'static str = "directory block";
    const TABLES: CheckpointTables = CheckpointTables {
        blocks: Table::DirBlock,
        by_sequence: Table::DirBlockHeight,
        by_merkle_root: Table::DirBlockMerkleRoot,
    };
    const TRACKS_HEIGHT: bool = true;

    fn height(&self) -> u64 {
        self.header.height
    }

    fn chain_id(&self) -> Hash256 {
        DIRECTORY_CHAIN_ID
    }

    /// `node(SHA256(header), body_root)`.
    ///
    /// The header encoding cannot fail for a well-formed value; if it ever
    /// did, the zero hash stands in for the header hash.
    fn key_merkle_root(&self) -> Hash256 {
        let header = self.header.hash().unwrap_or(Hash256::ZERO);
        node_hash(&header, &self.body_merkle_root())
    }
}

/// Entry block header.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct EntryBlockHeader {
    /// Chain the block belongs to.
    pub chain_id: Hash256,
    /// Height within the chain, contiguous from 0.
    pub height: u64,
    /// Directory block height the entry block was sealed into.
    pub dir_height: u64,
    /// Key Merkle root of the previous entry block in this chain.
    pub prev_key_mr: Hash256,
    pub timestamp: u64,
    pub entry_count: u32,
}

/// A sealed per-chain block of entry hashes.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct EntryBlock {
    pub header: EntryBlockHeader,
    pub entries: Vec<Hash256>,
}

impl EntryBlock {
    pub fn new(mut header: EntryBlockHeader, entries: Vec<Hash256>) -> Result<Self, CoreError> {
        header.entry_count = entry_count(entries.len())?;
        Ok(Self { header, entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Checkpoint for EntryBlock {
    const KIND: &'static str = "entry block";
    const TABLES: CheckpointTables = CheckpointTables {
        blocks: Table::EntryBlock,
        by_sequence: Table::EntryBlockSequence,
        by_merkle_root: Table::EntryBlockMerkleRoot,
    };

    fn height(&self) -> u64 {
        self.header.height
    }

    fn chain_id(&self) -> Hash256 {
        self.header.chain_id
    }

    fn key_merkle_root(&self) -> Hash256 {
        let header = codec::encode("entry block header", &self.header)
            .map(|bytes| sha256(&bytes))
            .unwrap_or(Hash256::ZERO);
        node_hash(&header, &merkle_root(&self.entries))
    }

    /// `chain_id || height`, so one chain's blocks sort contiguously.
    fn sequence_key_at(chain_id: &Hash256, height: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(40);
        key.extend_from_slice(chain_id.as_bytes());
        key.extend_from_slice(&height_key(height));
        key
    }
}

/// Anchor record linking a directory block to its Bitcoin transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DirBlockInfo {
    /// Content hash of the anchored directory block.
    pub db_hash: Hash256,
    /// Key Merkle root of the anchored directory block (the committed value).
    pub db_merkle_root: Hash256,
    pub db_height: u64,
    /// Unix timestamp in seconds at which the anchor was broadcast.
    pub timestamp: u64,
    /// Anchoring transaction id. Records without one are never persisted.
    pub btc_tx_hash: Option<Hash256>,
    /// Bitcoin block that confirmed the transaction, once known.
    pub btc_block_hash: Option<Hash256>,
    pub btc_block_height: u64,
    /// Set once the anchoring transaction is sufficiently confirmed.
    pub btc_confirmed: bool,
}

impl DirBlockInfo {
    const KIND: &'static str = "anchor record";

    /// A record for `block` with no transaction yet.
    pub fn for_block(block: &DirectoryBlock, block_hash: Hash256, timestamp: u64) -> Self {
        Self {
            db_hash: block_hash,
            db_merkle_root: block.key_merkle_root(),
            db_height: block.height(),
            timestamp,
            btc_tx_hash: None,
            btc_block_hash: None,
            btc_block_height: 0,
            btc_confirmed: false,
        }
    }

    pub fn with_tx(mut self, txid: Hash256) -> Self {
        self.btc_tx_hash = Some(txid);
        self
    }

    /// Whether the record carries a transaction and may be persisted.
    pub fn is_recordable(&self) -> bool {
        self.btc_tx_hash.is_some()
    }

    /// Mark the anchor confirmed in the given Bitcoin block.
    pub fn confirm(&mut self, btc_block_hash: Option<Hash256>, btc_block_height: u64) {
        self.btc_block_hash = btc_block_hash;
        self.btc_block_height = btc_block_height;
        self.btc_confirmed = true;
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        codec::encode(Self::KIND, self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        codec::decode(Self::KIND, bytes)
    }
}
