//! Merkle tree over claim leaves
//!
//! Interior nodes use `hash_pair`, which sorts its inputs, so a proof is just
//! the ordered list of sibling hashes from the leaf upward. Layers with an odd
//! number of nodes pair the last node with itself.

use loanbook_types::{AccountId, AssetId, Digest};

use crate::{claim_leaf, hash_pair, CryptoError, CryptoResult};

/// A fully materialised Merkle tree
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `layers[0]` are the leaves, the last layer holds the root
    layers: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes
    pub fn from_leaves(leaves: &[Digest]) -> CryptoResult<Self> {
        if leaves.is_empty() {
            return Err(CryptoError::EmptyTree);
        }

        let mut layers = vec![leaves.to_vec()];
        loop {
            let current = &layers[layers.len() - 1];
            if current.len() == 1 {
                break;
            }
            let next = current
                .chunks(2)
                .map(|chunk| {
                    let left = &chunk[0];
                    let right = chunk.get(1).unwrap_or(left);
                    hash_pair(left, right)
                })
                .collect();
            layers.push(next);
        }

        Ok(Self { layers })
    }

    /// Build a tree from `(claimant, asset_id)` allowlist entries
    pub fn from_claims(claims: &[(AccountId, AssetId)]) -> CryptoResult<Self> {
        let leaves: Vec<Digest> = claims
            .iter()
            .map(|(claimant, asset_id)| claim_leaf(claimant, *asset_id))
            .collect();
        Self::from_leaves(&leaves)
    }

    pub fn root(&self) -> Digest {
        // from_leaves guarantees a non-empty top layer
        self.layers[self.layers.len() - 1][0]
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.layers[0]
    }

    /// Number of hashing levels; also the length of every proof
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Sibling path for the leaf at `index`
    pub fn proof(&self, index: usize) -> CryptoResult<Vec<Digest>> {
        let leaves = self.leaves().len();
        if index >= leaves {
            return Err(CryptoError::LeafIndexOutOfRange { index, leaves });
        }

        let mut proof = Vec::with_capacity(self.depth());
        let mut current_index = index;
        for layer in &self.layers[..self.depth()] {
            let sibling_index = current_index ^ 1;
            let sibling = layer.get(sibling_index).unwrap_or(&layer[current_index]);
            proof.push(*sibling);
            current_index /= 2;
        }

        Ok(proof)
    }
}

/// Recompute the root from `leaf` and its sibling path and compare to `root`.
///
/// An empty proof is valid only for a single-leaf tree, where the leaf is the
/// root.
pub fn verify_proof(root: &Digest, proof: &[Digest], leaf: &Digest) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |current, sibling| hash_pair(&current, sibling));
    computed == *root
}
