//! Merkle tree computation for mining jobs.
//!
//! The pool never ships a merkle root: the root depends on the extranonce
//! the miner picks. Instead each job carries the ordered sibling hashes
//! ("branches") that fold the coinbase hash up to the root. The coinbase is
//! always promoted to index 0 of the tree, so the sibling at every level is
//! the element at index 1; that assumption is load-bearing and holds by
//! construction.

use crate::codec::double_sha256;

fn combine(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    double_sha256(&concat)
}

/// Classic merkle root over internal-order leaves, duplicating the last
/// element on odd levels. Callers guarantee at least one leaf (the
/// coinbase).
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    assert!(!leaves.is_empty(), "merkle tree requires at least one leaf");

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }
        level = level.chunks(2).map(|pair| combine(&pair[0], &pair[1])).collect();
    }
    level[0]
}

/// Sibling hashes needed to fold a coinbase hash at index 0 up to the root.
///
/// `tx_hashes` are the remaining leaves (internal byte order), in template
/// order. The branches never depend on the coinbase hash itself, which is
/// what lets the job be built before any extranonce is known: at each level
/// the coinbase path occupies index 0, its sibling is index 1, and no node
/// at index >= 1 is derived from leaf 0.
pub fn coinbase_branches(tx_hashes: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut level: Vec<[u8; 32]> = Vec::with_capacity(tx_hashes.len() + 1);
    // Placeholder for the coinbase leaf; its value is never emitted.
    level.push([0u8; 32]);
    level.extend_from_slice(tx_hashes);

    let mut branches = Vec::new();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }
        branches.push(level[1]);
        level = level.chunks(2).map(|pair| combine(&pair[0], &pair[1])).collect();
    }
    branches
}

/// Fold branches into a coinbase hash, left to right, to recover the root.
pub fn fold_branches(coinbase_hash: [u8; 32], branches: &[[u8; 32]]) -> [u8; 32] {
    branches
        .iter()
        .fold(coinbase_hash, |acc, branch| combine(&acc, branch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn leaf(seed: u8) -> [u8; 32] {
        [seed; 32]
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        assert_eq!(merkle_root(&[leaf(7)]), leaf(7));
    }

    #[test]
    fn test_two_leaf_root() {
        let root = merkle_root(&[leaf(1), leaf(2)]);
        assert_eq!(root, combine(&leaf(1), &leaf(2)));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        // Three leaves: the last is paired with itself.
        let root = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let left = combine(&leaf(1), &leaf(2));
        let right = combine(&leaf(3), &leaf(3));
        assert_eq!(root, combine(&left, &right));
    }

    #[test]
    fn test_no_transactions_means_no_branches() {
        assert!(coinbase_branches(&[]).is_empty());
        assert_eq!(fold_branches(leaf(9), &[]), leaf(9));
    }

    #[test]
    fn test_single_transaction_emits_its_hash() {
        // Regression guard: even at the two-leaf level the sibling must be
        // emitted, otherwise folding disagrees with the recomputed tree.
        let branches = coinbase_branches(&[leaf(5)]);
        assert_eq!(branches, vec![leaf(5)]);

        let cb = leaf(1);
        assert_eq!(fold_branches(cb, &branches), merkle_root(&[cb, leaf(5)]));
    }

    #[test_case(0; "no transactions")]
    #[test_case(1; "one transaction")]
    #[test_case(2; "two transactions")]
    #[test_case(3; "three transactions")]
    #[test_case(6; "six transactions")]
    #[test_case(11; "eleven transactions")]
    fn test_fold_matches_full_tree(tx_count: u8)
    {
        // Law: for any coinbase hash, folding the branches equals
        // recomputing the whole tree with the coinbase at index 0.
        let txs: Vec<[u8; 32]> = (0..tx_count).map(|i| leaf(i + 10)).collect();
        let branches = coinbase_branches(&txs);

        for seed in [0u8, 1, 0xab] {
            let coinbase_hash = double_sha256(&[seed]);
            let mut leaves = vec![coinbase_hash];
            leaves.extend_from_slice(&txs);

            assert_eq!(
                fold_branches(coinbase_hash, &branches),
                merkle_root(&leaves),
                "mismatch with {tx_count} transactions"
            );
        }
    }
}
