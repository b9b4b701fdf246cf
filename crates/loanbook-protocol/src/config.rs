//! Genesis configuration
//!
//! Everything fixed at initialization: the admin, the collateral unit, the
//! claim commitment, assets seeded at genesis and the debt token metadata.
//! Loaded from JSON; every field has a default.

use std::collections::HashSet;
use std::path::Path;

use loanbook_collateral::CollateralConfig;
use loanbook_crypto::MerkleTree;
use loanbook_debt::DebtTokenConfig;
use loanbook_types::{AccountId, Amount, AssetId, Digest};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Result};

/// One allowlisted `(account, asset_id)` claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub account: AccountId,
    pub asset_id: AssetId,
}

/// An asset minted directly to `account` at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub account: AccountId,
    pub asset_id: AssetId,
}

/// The committed claim set, as resolved from the config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCommitment {
    pub root: Digest,
    pub max_proof_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// The only account allowed to upgrade the lending logic
    pub admin: AccountId,
    /// Component account that holds deposited collateral
    pub vault_account: AccountId,
    /// Component account that mints claimed assets
    pub claims_account: AccountId,
    /// Value credited per deposited asset
    pub collateral_unit: Amount,
    /// Precomputed claim root. Optional when `allowlist` is given.
    pub merkle_root: Option<Digest>,
    /// Claimable `(account, asset_id)` pairs, in leaf order
    pub allowlist: Vec<AllowlistEntry>,
    /// Longest accepted proof. Defaults to the allowlist tree depth.
    pub max_proof_len: Option<usize>,
    pub initial_holdings: Vec<Holding>,
    pub debt_token: DebtTokenConfig,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let allowlist = [("alice", 1), ("bob", 2), ("carol", 3), ("dave", 4)]
            .into_iter()
            .map(|(name, id)| AllowlistEntry {
                account: AccountId::principal(name),
                asset_id: AssetId(id),
            })
            .collect();

        Self {
            admin: AccountId::principal("admin"),
            vault_account: CollateralConfig::default().vault_account,
            claims_account: AccountId::component("claim-registry"),
            collateral_unit: CollateralConfig::default().collateral_unit,
            merkle_root: None,
            allowlist,
            max_proof_len: None,
            initial_holdings: vec![
                Holding {
                    account: AccountId::principal("alice"),
                    asset_id: AssetId(101),
                },
                Holding {
                    account: AccountId::principal("bob"),
                    asset_id: AssetId(102),
                },
            ],
            debt_token: DebtTokenConfig::default(),
        }
    }
}

impl GenesisConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProtocolError::InvalidConfig {
            message: format!("malformed genesis JSON: {}", e),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProtocolError::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ProtocolError::InvalidConfig {
            message: e.to_string(),
        })
    }

    pub fn allowlist_pairs(&self) -> Vec<(AccountId, AssetId)> {
        self.allowlist
            .iter()
            .map(|e| (e.account.clone(), e.asset_id))
            .collect()
    }

    /// Tree over the allowlist, if one is configured
    pub fn allowlist_tree(&self) -> Result<Option<MerkleTree>> {
        if self.allowlist.is_empty() {
            return Ok(None);
        }
        Ok(Some(MerkleTree::from_claims(&self.allowlist_pairs())?))
    }

    /// Resolve the root and proof bound the claim registry runs with
    pub fn claim_commitment(&self) -> Result<ClaimCommitment> {
        match (self.allowlist_tree()?, self.merkle_root) {
            (Some(tree), configured) => {
                if let Some(root) = configured {
                    if root != tree.root() {
                        return Err(invalid(format!(
                            "merkle_root {} does not match allowlist root {}",
                            root,
                            tree.root()
                        )));
                    }
                }
                let max_proof_len = self.max_proof_len.unwrap_or(tree.depth());
                if max_proof_len < tree.depth() {
                    return Err(invalid(format!(
                        "max_proof_len {} is shorter than the tree depth {}",
                        max_proof_len,
                        tree.depth()
                    )));
                }
                Ok(ClaimCommitment {
                    root: tree.root(),
                    max_proof_len,
                })
            }
            (None, Some(root)) => {
                let max_proof_len = self.max_proof_len.ok_or_else(|| {
                    invalid("max_proof_len is required when only merkle_root is given")
                })?;
                Ok(ClaimCommitment {
                    root,
                    max_proof_len,
                })
            }
            (None, None) => Err(invalid("either merkle_root or allowlist is required")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.collateral_unit.is_zero() {
            return Err(invalid("collateral_unit must be greater than zero"));
        }
        if !self.vault_account.is_component() {
            return Err(invalid(format!("vault account {} is not a component", self.vault_account)));
        }
        if !self.claims_account.is_component() {
            return Err(invalid(format!("claims account {} is not a component", self.claims_account)));
        }
        if self.vault_account == self.claims_account {
            return Err(invalid("vault and claims accounts must differ"));
        }

        let mut seen = HashSet::new();
        for holding in &self.initial_holdings {
            if !seen.insert(holding.asset_id) {
                return Err(invalid(format!("asset {} seeded twice", holding.asset_id)));
            }
        }
        // a seeded asset could never be claimed: the claim mint would hit AssetExists
        if let Some(entry) = self.allowlist.iter().find(|e| seen.contains(&e.asset_id)) {
            return Err(invalid(format!(
                "asset {} is both seeded and claimable",
                entry.asset_id
            )));
        }

        self.claim_commitment()?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidConfig {
        message: message.into(),
    }
}
