//! Protocol constants: key-schema table tags and well-known chain ids.

use crate::types::Hash256;

/// Chain id of the directory chain (`00..0d`).
pub const DIRECTORY_CHAIN_ID: Hash256 = {
    let mut bytes = [0u8; 32];
    bytes[31] = 0x0d;
    Hash256(bytes)
};

/// Current directory block header version.
pub const DIR_BLOCK_VERSION: u8 = 0;

/// Logical tables of the key schema.
///
/// Every stored key is `tag || suffix`. Tags are distinct single bytes, so the
/// half-open range `[tag, tag + 1)` covers exactly one table and range scans
/// never cross into a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Table {
    /// Directory block hash → serialized directory block.
    DirBlock = 0x10,
    /// Big-endian height → directory block hash.
    DirBlockHeight = 0x11,
    /// Key Merkle root → directory block hash.
    DirBlockMerkleRoot = 0x12,
    /// Chain id → latest key Merkle root. Shared by every block variant.
    ChainHead = 0x13,
    /// Directory block hash → serialized anchor record.
    DirBlockInfo = 0x14,
    /// Entry block hash → serialized entry block.
    EntryBlock = 0x20,
    /// Chain id || big-endian height → entry block hash.
    EntryBlockSequence = 0x21,
    /// Key Merkle root → entry block hash.
    EntryBlockMerkleRoot = 0x22,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::DirBlock,
        Table::DirBlockHeight,
        Table::DirBlockMerkleRoot,
        Table::ChainHead,
        Table::DirBlockInfo,
        Table::EntryBlock,
        Table::EntryBlockSequence,
        Table::EntryBlockMerkleRoot,
    ];

    /// Single-byte key prefix.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Human-readable table name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Table::DirBlock => "dir-block",
            Table::DirBlockHeight => "dir-block-height",
            Table::DirBlockMerkleRoot => "dir-block-merkle-root",
            Table::ChainHead => "chain-head",
            Table::DirBlockInfo => "dir-block-info",
            Table::EntryBlock => "entry-block",
            Table::EntryBlockSequence => "entry-block-sequence",
            Table::EntryBlockMerkleRoot => "entry-block-merkle-root",
        }
    }

    /// Full key for `suffix` within this table.
    pub fn key(self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + suffix.len());
        key.push(self.tag());
        key.extend_from_slice(suffix);
        key
    }

    /// Half-open `[start, end)` key range covering the whole table.
    pub fn bounds(self) -> (Vec<u8>, Vec<u8>) {
        (vec![self.tag()], vec![self.tag() + 1])
    }
}

/// Encode a height as big-endian bytes for ordered iteration.
pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}
