//! Property tests for the block store indexes.

use notary_core::{Checkpoint, DirBlockInfo, DirectoryBlock, Hash256};
use notary_store::{BlockStore, RangeEnd};
use notary_tests::helpers::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every inserted block is reachable by hash, height, and key Merkle root.
    #[test]
    fn three_index_round_trip(
        heights in prop::collection::btree_set(0u64..10_000, 1..20),
        width in 1usize..6,
    ) {
        let store = BlockStore::in_memory();
        let mut inserted = Vec::new();
        for &height in &heights {
            let block = dir_block(height, width);
            let hash = store.insert_block(&block).unwrap();
            inserted.push((block, hash));
        }

        for (block, hash) in &inserted {
            let by_hash: DirectoryBlock = store.block_by_hash(hash).unwrap();
            prop_assert_eq!(&by_hash, block);
            prop_assert_eq!(&store.block_by_height(block.height()).unwrap(), block);
            let by_root: DirectoryBlock =
                store.block_by_merkle_root(&block.key_merkle_root()).unwrap();
            prop_assert_eq!(&by_root, block);
            prop_assert_eq!(store.height_of(hash).unwrap(), Some(block.height()));
        }

        let max = heights.iter().max().copied();
        prop_assert_eq!(store.latest_height().map(|(h, _)| h), max);
    }

    /// A bounded range over a gap-free chain yields exactly its heights, in order.
    #[test]
    fn range_yields_every_height_in_order(
        len in 1u64..40,
        a in 0u64..40,
        b in 0u64..40,
    ) {
        let (h1, h2) = (a.min(b) % len, a.max(b) % len);
        let (h1, h2) = (h1.min(h2), h1.max(h2));

        let store = BlockStore::in_memory();
        let hashes: Vec<Hash256> = dir_chain(len)
            .iter()
            .map(|block| store.insert_block(block).unwrap())
            .collect();

        let got: Vec<Hash256> = store
            .range_by_height(h1, RangeEnd::Bounded(h2 + 1))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(got, hashes[h1 as usize..=h2 as usize].to_vec());
    }

    /// Re-inserting a block changes neither the height nor the Merkle root index.
    #[test]
    fn reinsert_is_idempotent(height in 0u64..1_000, width in 1usize..5) {
        let store = BlockStore::in_memory();
        let block = dir_block(height, width);

        let first = store.insert_block(&block).unwrap();
        let second = store.insert_block(&block).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(store.hash_by_height(height).unwrap(), first);
        let by_root: DirectoryBlock = store.block_by_merkle_root(&block.key_merkle_root()).unwrap();
        prop_assert_eq!(by_root.content_hash().unwrap(), first);
        prop_assert_eq!(store.all_blocks::<DirectoryBlock>().unwrap().len(), 1);
    }

    /// An anchor record without a transaction is never stored.
    #[test]
    fn anchor_record_without_tx_is_dropped(height in 0u64..1_000) {
        let store = BlockStore::in_memory();
        let block = dir_block(height, 2);
        let hash = store.insert_block(&block).unwrap();

        let record = DirBlockInfo::for_block(&block, hash, 0);
        prop_assert!(!store.insert_anchor_proof(&record).unwrap());
        prop_assert_eq!(store.anchor_info_by_hash(&hash).unwrap(), None);
        prop_assert!(store.all_anchor_infos().unwrap().is_empty());
    }
}

#[test]
fn unbounded_range_stops_at_first_gap() {
    let store = BlockStore::in_memory();
    let chain = dir_chain(6);
    for block in chain.iter().filter(|b| b.height() != 3) {
        store.insert_block(block).unwrap();
    }

    let got: Vec<Hash256> = store
        .range_by_height(0, RangeEnd::Unbounded)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(got.len(), 3);
}
