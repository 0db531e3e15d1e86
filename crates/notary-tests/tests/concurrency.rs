//! Concurrent writers and scanners over one block store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use notary_core::constants::{Table, DIRECTORY_CHAIN_ID};
use notary_core::{Checkpoint, DirBlockInfo, DirectoryBlock};
use notary_node_lib::export_jsonl;
use notary_store::BlockStore;
use notary_tests::helpers::*;

#[test]
fn height_cache_ends_at_highest_committed_height() {
    let store = Arc::new(BlockStore::in_memory());
    let blocks: Vec<DirectoryBlock> = (0..64).map(|height| dir_block(height, 2)).collect();
    let expected = store_hash_of(&blocks[63]);

    // Each thread takes every fourth height, highest first, so commits land
    // out of height order.
    let handles: Vec<_> = (0..4usize)
        .map(|lane| {
            let store = Arc::clone(&store);
            let mine: Vec<DirectoryBlock> = blocks
                .iter()
                .filter(|b| b.height() as usize % 4 == lane)
                .rev()
                .cloned()
                .collect();
            thread::spawn(move || {
                for block in &mine {
                    store.insert_block(block).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.latest_height(), Some((63, expected)));
    assert_eq!(store.all_blocks::<DirectoryBlock>().unwrap().len(), 64);
    assert_eq!(
        store.chain_head(&DIRECTORY_CHAIN_ID).unwrap(),
        blocks[63].key_merkle_root()
    );

    let reopened = BlockStore::new(store.backend().fork()).unwrap();
    assert_eq!(reopened.latest_height(), Some((63, expected)));
}

#[test]
fn export_never_lists_anchor_without_its_block() {
    let store = Arc::new(BlockStore::in_memory());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for block in dir_chain(150) {
                let mut txn = store.transaction();
                let hash = txn.insert_block(&block).unwrap();
                let record = DirBlockInfo::for_block(&block, hash, 0).with_tx(block.key_merkle_root());
                txn.insert_anchor_proof(&record).unwrap();
                txn.commit().unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut exports = 0;
    while !done.load(Ordering::SeqCst) || exports == 0 {
        let mut out = Vec::new();
        let summary = export_jsonl(&*store, &mut out).unwrap();
        assert_eq!(summary.blocks, summary.anchors);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let block_hashes: HashSet<&str> = lines
            .iter()
            .filter(|l| l["kind"] == "dir_block")
            .filter_map(|l| l["hash"].as_str())
            .collect();
        for anchor in lines.iter().filter(|l| l["kind"] == "anchor") {
            let db_hash = anchor["db_hash"].as_str().unwrap();
            assert!(block_hashes.contains(db_hash), "anchor for missing block {db_hash}");
        }
        exports += 1;
    }

    writer.join().unwrap();
}

#[test]
fn scans_never_observe_partial_inserts() {
    let store = Arc::new(BlockStore::in_memory());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for block in dir_chain(200) {
                store.insert_block(&block).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut scans = 0;
    while !done.load(Ordering::SeqCst) || scans == 0 {
        // Blocks are scanned first and the indexes after; the store only
        // grows, so every index table holds at least as many rows.
        let blocks = store.all_blocks::<DirectoryBlock>().unwrap();
        let heights = store.scan_table(Table::DirBlockHeight).count();
        let roots = store.scan_table(Table::DirBlockMerkleRoot).count();
        assert!(heights >= blocks.len(), "{heights} heights < {} blocks", blocks.len());
        assert!(roots >= blocks.len(), "{roots} roots < {} blocks", blocks.len());

        for block in &blocks {
            let hash = store.hash_by_height(block.height()).unwrap();
            assert_eq!(hash, store_hash_of(block));
            let by_root: DirectoryBlock = store.block_by_merkle_root(&block.key_merkle_root()).unwrap();
            assert_eq!(&by_root, block);
        }
        scans += 1;
    }

    writer.join().unwrap();
    assert_eq!(store.all_blocks::<DirectoryBlock>().unwrap().len(), 200);
}

fn store_hash_of(block: &DirectoryBlock) -> notary_core::Hash256 {
    block.content_hash().unwrap()
}
