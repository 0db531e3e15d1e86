//! JSON-lines export of directory blocks and anchor records.
//!
//! One object per line. Directory blocks come first in height order, then
//! anchor records in block-hash order:
//!
//! ```text
//! {"kind":"dir_block","height":0,"hash":"…","key_mr":"…","block":{…}}
//! {"kind":"anchor","db_hash":"…","btc_tx_hash":"…",…}
//! ```

use std::io::Write;

use notary_core::{Checkpoint, DirBlockInfo, DirectoryBlock, Hash256, StoreError};
use notary_store::{BlockStore, KvBackend};
use serde::Serialize;
use tracing::info;

use crate::error::NodeError;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ExportLine<'a> {
    DirBlock {
        height: u64,
        hash: Hash256,
        key_mr: Hash256,
        block: &'a DirectoryBlock,
    },
    Anchor(&'a DirBlockInfo),
}

/// Counts of exported records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub blocks: usize,
    pub anchors: usize,
}

fn write_line<W: Write>(writer: &mut W, line: &ExportLine<'_>) -> Result<(), NodeError> {
    serde_json::to_writer(&mut *writer, line).map_err(|e| NodeError::Export(e.to_string()))?;
    writer
        .write_all(b"\n")
        .map_err(|e| NodeError::Export(e.to_string()))
}

/// Write every directory block and anchor record in `store` to `writer`.
///
/// Both tables are read from one consistent view, so an exported anchor
/// record always has its directory block in the same export.
pub fn export_jsonl<K: KvBackend, W: Write>(
    store: &BlockStore<K>,
    mut writer: W,
) -> Result<ExportSummary, NodeError> {
    let (mut blocks, anchors) = store.blocks_and_anchors()?;
    blocks.sort_by_key(|b| b.height());

    for block in &blocks {
        let hash = block.content_hash().map_err(StoreError::from)?;
        write_line(
            &mut writer,
            &ExportLine::DirBlock {
                height: block.height(),
                hash,
                key_mr: block.key_merkle_root(),
                block,
            },
        )?;
    }

    for record in &anchors {
        write_line(&mut writer, &ExportLine::Anchor(record))?;
    }
    writer.flush().map_err(|e| NodeError::Export(e.to_string()))?;

    let summary = ExportSummary {
        blocks: blocks.len(),
        anchors: anchors.len(),
    };
    info!(blocks = summary.blocks, anchors = summary.anchors, "export written");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::constants::DIR_BLOCK_VERSION;
    use notary_core::{DirBlockHeader, DirEntry};

    fn block(height: u64) -> DirectoryBlock {
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
            vec![DirEntry {
                chain_id: Hash256([height as u8 + 1; 32]),
                key_mr: Hash256([0xAB; 32]),
            }],
        )
        .unwrap()
    }

    #[test]
    fn exports_blocks_by_height_then_anchors() {
        let store = BlockStore::in_memory();
        let mut hashes = Vec::new();
        for height in [2, 0, 1] {
            hashes.push((height, store.insert_block(&block(height)).unwrap()));
        }
        let (_, hash0) = hashes.iter().find(|(h, _)| *h == 0).copied().unwrap();
        let record = DirBlockInfo::for_block(&block(0), hash0, 5).with_tx(Hash256([9; 32]));
        store.insert_anchor_proof(&record).unwrap();

        let mut out = Vec::new();
        let summary = export_jsonl(&store, &mut out).unwrap();
        assert_eq!(summary, ExportSummary { blocks: 3, anchors: 1 });

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        let heights: Vec<u64> = lines[..3]
            .iter()
            .map(|l| l["height"].as_u64().unwrap())
            .collect();
        assert_eq!(heights, vec![0, 1, 2]);
        assert_eq!(lines[0]["kind"], "dir_block");
        assert_eq!(lines[0]["hash"], hash0.to_hex());
        assert_eq!(lines[3]["kind"], "anchor");
        assert_eq!(lines[3]["db_hash"], hash0.to_hex());
    }

    #[test]
    fn empty_store_exports_nothing() {
        let store = BlockStore::in_memory();
        let mut out = Vec::new();
        assert_eq!(export_jsonl(&store, &mut out).unwrap(), ExportSummary::default());
        assert!(out.is_empty());
    }
}
