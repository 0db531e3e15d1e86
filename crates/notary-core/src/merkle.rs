//! SHA-256 Merkle tree for block body commitment.
//!
//! Uses domain-separated hashing to prevent second-preimage attacks:
//! - Leaf hash: `SHA256(0x00 || data)`
//! - Internal node: `SHA256(0x01 || left || right)`
//!
//! Odd-length layers are padded by duplicating the last element.
//! Empty trees produce [`Hash256::ZERO`].

use crate::types::{sha256_concat, Hash256};

/// Domain separation prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
const NODE_PREFIX: u8 = 0x01;

/// Compute a domain-separated leaf hash: `SHA256(0x00 || data)`.
pub fn leaf_hash(data: &Hash256) -> Hash256 {
    sha256_concat(&[&[LEAF_PREFIX], data.as_bytes()])
}

/// Compute a domain-separated internal node hash: `SHA256(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    sha256_concat(&[&[NODE_PREFIX], left.as_bytes(), right.as_bytes()])
}

/// Compute the Merkle root from a slice of leaf values.
///
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();

    while current.len() > 1 {
        current = next_layer(&current);
    }

    current[0]
}

/// Pairs adjacent hashes with [`node_hash`], duplicating the last element
/// when the layer has an odd number of entries.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    layer
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => node_hash(single, single),
            _ => unreachable!("chunks(2) yields one or two elements"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash256 {
        Hash256([b; 32])
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        assert_eq!(merkle_root(&[h(1)]), leaf_hash(&h(1)));
    }

    #[test]
    fn two_leaves() {
        let expected = node_hash(&leaf_hash(&h(1)), &leaf_hash(&h(2)));
        assert_eq!(merkle_root(&[h(1), h(2)]), expected);
    }

    #[test]
    fn odd_layer_duplicates_last() {
        let l = [leaf_hash(&h(1)), leaf_hash(&h(2)), leaf_hash(&h(3))];
        let expected = node_hash(&node_hash(&l[0], &l[1]), &node_hash(&l[2], &l[2]));
        assert_eq!(merkle_root(&[h(1), h(2), h(3)]), expected);
    }

    #[test]
    fn order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }

    #[test]
    fn leaf_and_node_domains_differ() {
        // A leaf can never collide with an internal node over the same bytes.
        assert_ne!(leaf_hash(&h(1)), node_hash(&h(1), &h(1)));
    }
}
