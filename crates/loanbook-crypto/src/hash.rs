//! Hashing utilities for Loanbook

use loanbook_types::{AccountId, AssetId, Digest};
use sha2::{Digest as _, Sha256};

/// Compute SHA-256 hash of data
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// Compute hash of multiple items
pub fn hash_all(items: &[&[u8]]) -> Digest {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item);
    }
    Digest(hasher.finalize().into())
}

/// Hash an interior node. The pair is sorted first, so the result does not
/// depend on which side the sibling sits.
pub fn hash_pair(a: &Digest, b: &Digest) -> Digest {
    if a <= b {
        hash_all(&[a.as_bytes().as_slice(), b.as_bytes().as_slice()])
    } else {
        hash_all(&[b.as_bytes().as_slice(), a.as_bytes().as_slice()])
    }
}

/// Leaf committing a claimant to one asset id
pub fn claim_leaf(claimant: &AccountId, asset_id: AssetId) -> Digest {
    hash_all(&[
        claimant.canonical_bytes().as_slice(),
        asset_id.to_be_bytes().as_slice(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"Hello, Loanbook!").to_hex();
        assert_eq!(hash.len(), 64);
        assert_eq!(
            sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_pair_is_symmetric() {
        let a = sha256(b"a");
        let b = sha256(b"b");
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
        assert_ne!(hash_pair(&a, &b), hash_pair(&a, &a));
    }

    #[test]
    fn test_claim_leaf_binds_account_and_asset() {
        let alice = AccountId::principal("alice");
        let bob = AccountId::principal("bob");
        let leaf = claim_leaf(&alice, AssetId(1));

        assert_eq!(leaf, claim_leaf(&alice, AssetId(1)));
        assert_ne!(leaf, claim_leaf(&alice, AssetId(2)));
        assert_ne!(leaf, claim_leaf(&bob, AssetId(1)));
    }
}
