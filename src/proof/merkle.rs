//! Merkle Tree Commitments
//!
//! Binary Merkle tree using SHA-256 over a race's tick history. The root
//! goes into the transcript; an inclusion proof lets anyone check a single
//! published snapshot without downloading the whole history.

use sha2::{Sha256, Digest};
use serde::{Serialize, Deserialize};

use crate::core::hash::StateHash;

/// Domain separator for Merkle tree leaf nodes.
const MERKLE_LEAF_DOMAIN: &[u8] = b"MARBLE_RACE_MERKLE_LEAF_V1";

/// Domain separator for Merkle tree internal nodes.
const MERKLE_NODE_DOMAIN: &[u8] = b"MARBLE_RACE_MERKLE_NODE_V1";

/// Padding hash for the unused slots of the last level.
fn empty_hash() -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(b"MARBLE_RACE_MERKLE_EMPTY_V1");
    hasher.finalize().into()
}

/// Binary Merkle tree.
///
/// Leaves are padded to a power of two; levels are computed on construction.
#[derive(Clone, Debug, Default)]
pub struct MerkleTree {
    /// All tree levels (padded leaves at index 0, root at last index)
    levels: Vec<Vec<StateHash>>,
    /// Number of real (unpadded) leaves
    leaf_count: usize,
}

impl MerkleTree {
    /// Build from raw leaf data. Each item is hashed with domain separation.
    pub fn from_leaves<T: AsRef<[u8]>>(data: &[T]) -> Self {
        let hashes: Vec<StateHash> = data.iter().map(|item| hash_leaf(item.as_ref())).collect();
        Self::from_leaf_hashes(hashes)
    }

    /// Build from pre-hashed leaves.
    pub fn from_leaf_hashes(leaves: Vec<StateHash>) -> Self {
        let leaf_count = leaves.len();
        if leaf_count == 0 {
            return Self::default();
        }

        let mut current = leaves;
        current.resize(leaf_count.next_power_of_two(), empty_hash());

        let mut levels = vec![current.clone()];
        while current.len() > 1 {
            current = current
                .chunks(2)
                .map(|pair| hash_nodes(&pair[0], &pair[1]))
                .collect();
            levels.push(current.clone());
        }

        Self { levels, leaf_count }
    }

    /// Root hash; the padding hash for an empty tree.
    pub fn root(&self) -> StateHash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(empty_hash)
    }

    /// Number of real leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn generate_proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut current = index;

        // Every level except the root contributes one sibling
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = current % 2 == 0;
            let sibling = if is_right { current + 1 } else { current - 1 };
            siblings.push((level[sibling], is_right));
            current /= 2;
        }

        Some(MerkleProof { leaf_index: index, siblings })
    }

    /// Verify a proof for raw leaf data.
    pub fn verify_proof(root: &StateHash, proof: &MerkleProof, leaf_data: &[u8]) -> bool {
        Self::verify_proof_with_hash(root, proof, &hash_leaf(leaf_data))
    }

    /// Verify a proof for a pre-hashed leaf.
    pub fn verify_proof_with_hash(root: &StateHash, proof: &MerkleProof, leaf_hash: &StateHash) -> bool {
        let computed = proof.siblings.iter().fold(*leaf_hash, |acc, (sibling, is_right)| {
            if *is_right {
                hash_nodes(&acc, sibling)
            } else {
                hash_nodes(sibling, &acc)
            }
        });
        computed == *root
    }
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf this proof is for.
    pub leaf_index: usize,
    /// Sibling hashes along the path (hash, sibling is on the right).
    pub siblings: Vec<(StateHash, bool)>,
}

/// Hash leaf data with domain separation.
pub fn hash_leaf(data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(MERKLE_LEAF_DOMAIN);
    hasher.update(data);
    hasher.finalize().into()
}

fn hash_nodes(left: &StateHash, right: &StateHash) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(MERKLE_NODE_DOMAIN);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::from_leaf_hashes(Vec::new());
        assert_eq!(tree.root(), empty_hash());
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.generate_proof(0).is_none());
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = MerkleTree::from_leaves(&[b"tick-0"]);
        assert_eq!(tree.root(), hash_leaf(b"tick-0"));

        let proof = tree.generate_proof(0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(MerkleTree::verify_proof(&tree.root(), &proof, b"tick-0"));
    }

    #[test]
    fn test_root_determinism_and_sensitivity() {
        let a = MerkleTree::from_leaves(&[b"a", b"b", b"c", b"d"]);
        let b = MerkleTree::from_leaves(&[b"a", b"b", b"c", b"d"]);
        let c = MerkleTree::from_leaves(&[b"a", b"b", b"d", b"c"]);

        assert_eq!(a.root(), b.root());
        assert_ne!(a.root(), c.root());
    }

    #[test]
    fn test_every_leaf_proves() {
        let leaves: Vec<Vec<u8>> = (0..37).map(|i| format!("snapshot_{}", i).into_bytes()).collect();
        let tree = MerkleTree::from_leaves(&leaves);
        let root = tree.root();

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.generate_proof(i).unwrap();
            assert_eq!(proof.leaf_index, i);
            assert!(MerkleTree::verify_proof(&root, &proof, leaf));
        }
    }

    #[test]
    fn test_tampered_leaf_fails() {
        let tree = MerkleTree::from_leaves(&[b"leaf1", b"leaf2", b"leaf3"]);
        let proof = tree.generate_proof(1).unwrap();
        assert!(!MerkleTree::verify_proof(&tree.root(), &proof, b"leaf9"));
        assert!(tree.generate_proof(3).is_none());
    }
}
