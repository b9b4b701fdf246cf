//! Loanbook Claims - One-time asset claims against a committed allowlist
//!
//! The allowlist is fixed at initialization as a Merkle root over
//! `claim_leaf(claimant, asset_id)` entries. A claim:
//!
//! 1. Fails with `AlreadyClaimed` if the asset id was ever claimed before
//! 2. Fails with `InvalidProof` unless the proof authenticates the leaf
//! 3. Records the claim, then mints the asset to the claimant
//!
//! The claimed flag is written before the mint call and a failed mint clears
//! it again. Claims share custody's operation guard, so a claim made from
//! inside the mint's receive hook is refused.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loanbook_crypto::{claim_leaf, verify_proof};
use loanbook_custody::{AssetCustody, CustodyError, MintAuthority, OpGuard};
use loanbook_types::{AccountId, AssetId, Digest, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Errors that can occur when claiming
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Asset {asset_id} has already been claimed")]
    AlreadyClaimed { asset_id: AssetId },

    #[error("Invalid proof for {claimant} claiming {asset_id}")]
    InvalidProof { claimant: String, asset_id: AssetId },

    #[error("Nested claim refused")]
    Reentrancy,

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),
}

impl ClaimError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyClaimed { .. } => ErrorCode::AlreadyClaimed,
            Self::InvalidProof { .. } => ErrorCode::InvalidProof,
            Self::Reentrancy => ErrorCode::Reentrancy,
            Self::Custody(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;

/// A redeemed claim. Terminal once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub asset_id: AssetId,
    pub claimant: AccountId,
    pub claimed_at: DateTime<Utc>,
}

/// Registry of redeemed claims
#[derive(Clone)]
pub struct ClaimRegistry {
    root: Digest,
    max_proof_len: usize,
    custody: AssetCustody,
    authority: MintAuthority,
    claims: Arc<RwLock<HashMap<AssetId, ClaimRecord>>>,
    op_guard: OpGuard,
}

impl ClaimRegistry {
    /// Create a registry for `root`. `max_proof_len` is the tree depth;
    /// longer proofs are rejected without hashing.
    pub fn new(
        root: Digest,
        max_proof_len: usize,
        custody: AssetCustody,
        authority: MintAuthority,
    ) -> Self {
        let op_guard = custody.op_guard().sibling();
        Self {
            root,
            max_proof_len,
            custody,
            authority,
            claims: Arc::new(RwLock::new(HashMap::new())),
            op_guard,
        }
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn max_proof_len(&self) -> usize {
        self.max_proof_len
    }

    /// Redeem the claim for `asset_id` on behalf of `claimant`
    pub async fn claim(
        &self,
        claimant: &AccountId,
        asset_id: AssetId,
        proof: &[Digest],
    ) -> Result<ClaimRecord> {
        self.op_guard
            .run(self.claim_inner(claimant, asset_id, proof), || ClaimError::Reentrancy)
            .await
    }

    async fn claim_inner(
        &self,
        claimant: &AccountId,
        asset_id: AssetId,
        proof: &[Digest],
    ) -> Result<ClaimRecord> {
        let record = {
            let mut claims = self.claims.write().await;
            if claims.contains_key(&asset_id) {
                warn!(%claimant, %asset_id, "Re-claim rejected");
                return Err(ClaimError::AlreadyClaimed { asset_id });
            }

            let leaf = claim_leaf(claimant, asset_id);
            if proof.len() > self.max_proof_len || !verify_proof(&self.root, proof, &leaf) {
                warn!(%claimant, %asset_id, proof_len = proof.len(), "Claim proof rejected");
                return Err(ClaimError::InvalidProof {
                    claimant: claimant.to_string(),
                    asset_id,
                });
            }

            let record = ClaimRecord {
                asset_id,
                claimant: claimant.clone(),
                claimed_at: Utc::now(),
            };
            claims.insert(asset_id, record.clone());
            record
        };

        if let Err(e) = self.custody.mint(&self.authority, claimant, asset_id).await {
            self.claims.write().await.remove(&asset_id);
            warn!(%claimant, %asset_id, error = %e, "Claim mint failed, claim cleared");
            return Err(e.into());
        }

        info!(%claimant, %asset_id, "Asset claimed");
        Ok(record)
    }

    pub async fn is_claimed(&self, asset_id: AssetId) -> bool {
        self.claims.read().await.contains_key(&asset_id)
    }

    pub async fn record(&self, asset_id: AssetId) -> Option<ClaimRecord> {
        self.claims.read().await.get(&asset_id).cloned()
    }

    /// All redeemed claims, ordered by asset id
    pub async fn claims(&self) -> Vec<ClaimRecord> {
        let claims = self.claims.read().await;
        let mut records: Vec<ClaimRecord> = claims.values().cloned().collect();
        records.sort_by_key(|r| r.asset_id);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loanbook_crypto::MerkleTree;
    use loanbook_custody::{CustodyReceiver, MintSource, ReceiveAck};

    fn allowlist() -> Vec<(AccountId, AssetId)> {
        vec![
            (AccountId::principal("alice"), AssetId(1)),
            (AccountId::principal("bob"), AssetId(2)),
            (AccountId::principal("carol"), AssetId(3)),
            (AccountId::principal("dave"), AssetId(4)),
        ]
    }

    async fn setup() -> (ClaimRegistry, AssetCustody, MerkleTree) {
        let admin = AccountId::principal("admin");
        let custody = AssetCustody::new(admin.clone());
        let authority = custody
            .grant_mint_authority(&admin, AccountId::component("claims"), MintSource::Claim)
            .await
            .unwrap();
        let tree = MerkleTree::from_claims(&allowlist()).unwrap();
        let registry = ClaimRegistry::new(tree.root(), tree.depth(), custody.clone(), authority);
        (registry, custody, tree)
    }

    #[tokio::test]
    async fn test_first_claim_succeeds() {
        let (registry, custody, tree) = setup().await;
        let alice = AccountId::principal("alice");

        let record = registry
            .claim(&alice, AssetId(1), &tree.proof(0).unwrap())
            .await
            .unwrap();

        assert_eq!(record.claimant, alice);
        assert!(registry.is_claimed(AssetId(1)).await);
        assert_eq!(custody.owner_of(AssetId(1)).await, Some(alice));
    }

    #[tokio::test]
    async fn test_second_claim_fails() {
        let (registry, _, tree) = setup().await;
        let alice = AccountId::principal("alice");
        let proof = tree.proof(0).unwrap();

        registry.claim(&alice, AssetId(1), &proof).await.unwrap();
        let result = registry.claim(&alice, AssetId(1), &proof).await;

        assert_eq!(result.unwrap_err(), ClaimError::AlreadyClaimed { asset_id: AssetId(1) });
    }

    #[tokio::test]
    async fn test_reclaim_fails_even_with_bad_proof() {
        let (registry, _, tree) = setup().await;
        let alice = AccountId::principal("alice");
        registry.claim(&alice, AssetId(1), &tree.proof(0).unwrap()).await.unwrap();

        let result = registry.claim(&AccountId::principal("eve"), AssetId(1), &[]).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::AlreadyClaimed);
    }

    #[tokio::test]
    async fn test_all_allowlisted_pairs_claimable() {
        let (registry, custody, tree) = setup().await;

        for (i, (claimant, asset_id)) in allowlist().into_iter().enumerate() {
            registry
                .claim(&claimant, asset_id, &tree.proof(i).unwrap())
                .await
                .unwrap();
            assert_eq!(custody.owner_of(asset_id).await, Some(claimant));
        }
        assert_eq!(registry.claims().await.len(), 4);
    }

    #[tokio::test]
    async fn test_wrong_claimant_rejected() {
        let (registry, custody, tree) = setup().await;
        let bob = AccountId::principal("bob");

        // bob presents alice's valid path
        let result = registry.claim(&bob, AssetId(1), &tree.proof(0).unwrap()).await;

        assert!(matches!(result, Err(ClaimError::InvalidProof { .. })));
        assert!(!registry.is_claimed(AssetId(1)).await);
        assert_eq!(custody.owner_of(AssetId(1)).await, None);
    }

    #[tokio::test]
    async fn test_unlisted_asset_rejected() {
        let (registry, _, tree) = setup().await;
        let alice = AccountId::principal("alice");

        let result = registry.claim(&alice, AssetId(5), &tree.proof(0).unwrap()).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidProof);
    }

    #[tokio::test]
    async fn test_overlong_proof_rejected() {
        let (registry, _, tree) = setup().await;
        let alice = AccountId::principal("alice");
        let mut proof = tree.proof(0).unwrap();
        proof.push(tree.root());

        let result = registry.claim(&alice, AssetId(1), &proof).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidProof);
    }

    #[tokio::test]
    async fn test_failed_mint_clears_claim() {
        let (registry, custody, tree) = setup().await;
        let alice = AccountId::principal("alice");

        // the asset already exists in custody, so the mint step fails
        let admin = AccountId::principal("admin");
        let genesis = custody
            .grant_mint_authority(&admin, admin.clone(), MintSource::Genesis)
            .await
            .unwrap();
        custody.mint(&genesis, &admin, AssetId(1)).await.unwrap();

        let result = registry.claim(&alice, AssetId(1), &tree.proof(0).unwrap()).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::AssetExists);
        assert!(!registry.is_claimed(AssetId(1)).await);
    }

    /// Component claimant that claims its asset a second time while the
    /// first claim is minting it
    struct Treasury {
        registry: ClaimRegistry,
        proof: Vec<Digest>,
        nested: std::sync::Mutex<Option<Result<ClaimRecord>>>,
    }

    #[async_trait]
    impl CustodyReceiver for Treasury {
        async fn on_custody_received(&self, _: Option<&AccountId>, asset_id: AssetId) -> ReceiveAck {
            let nested = self
                .registry
                .claim(&AccountId::component("treasury"), asset_id, &self.proof)
                .await;
            *self.nested.lock().unwrap() = Some(nested);
            ReceiveAck::Accepted
        }
    }

    #[tokio::test]
    async fn test_claim_from_mint_hook_mints_once() {
        let admin = AccountId::principal("admin");
        let treasury = AccountId::component("treasury");
        let custody = AssetCustody::new(admin.clone());
        let authority = custody
            .grant_mint_authority(&admin, AccountId::component("claims"), MintSource::Claim)
            .await
            .unwrap();
        let mut entries = allowlist();
        entries.push((treasury.clone(), AssetId(9)));
        let tree = MerkleTree::from_claims(&entries).unwrap();
        let proof = tree.proof(4).unwrap();
        let registry = ClaimRegistry::new(tree.root(), tree.depth(), custody.clone(), authority);

        let hook = Arc::new(Treasury {
            registry: registry.clone(),
            proof: proof.clone(),
            nested: std::sync::Mutex::new(None),
        });
        custody.register_receiver(treasury.clone(), hook.clone()).await.unwrap();

        let record = registry.claim(&treasury, AssetId(9), &proof).await.unwrap();

        assert_eq!(record.claimant, treasury);
        let nested = hook.nested.lock().unwrap().take();
        assert!(matches!(
            nested,
            Some(Err(ClaimError::Reentrancy)) | Some(Err(ClaimError::AlreadyClaimed { .. }))
        ));
        assert_eq!(custody.total_minted().await, 1);
        assert_eq!(custody.owner_of(AssetId(9)).await, Some(treasury));
        assert_eq!(registry.claims().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_by_different_claimants() {
        let (registry, custody, tree) = setup().await;
        let tree = Arc::new(tree);

        let mut handles = Vec::new();
        for (i, (claimant, asset_id)) in allowlist().into_iter().enumerate() {
            let registry = registry.clone();
            let tree = tree.clone();
            handles.push(tokio::spawn(async move {
                let proof = tree.proof(i).unwrap();
                registry.claim(&claimant, asset_id, &proof).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.claims().await.len(), 4);
        assert_eq!(custody.total_minted().await, 4);
    }
}
