//! Loanbook Custody - Ownership records for non-fungible collateral assets
//!
//! Custody is:
//! - The single source of truth for who owns each asset
//! - Mint-gated (only holders of a granted `MintAuthority` can create assets)
//! - Handshake-checked (transfers into a component account must be accepted
//!   by that component's registered `CustodyReceiver`)
//!
//! # Invariants
//!
//! 1. Every asset id exists at most once
//! 2. A transfer moves an asset only out of its current owner
//! 3. A component never receives an asset it has not accepted
//! 4. Failed operations leave ownership unchanged

mod guard;

pub use guard::OpGuard;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loanbook_types::{AccountId, AssetId, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that can occur in custody operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Asset not found: {asset_id}")]
    AssetNotFound { asset_id: AssetId },

    #[error("Asset already exists: {asset_id}")]
    AssetExists { asset_id: AssetId },

    #[error("{caller} does not own asset {asset_id}")]
    NotOwner { asset_id: AssetId, caller: String },

    #[error("Recipient {recipient} cannot receive custody: {reason}")]
    RecipientCannotReceive { recipient: String, reason: String },

    #[error("Unauthorized: {caller}")]
    Unauthorized { caller: String },

    #[error("Receivers can only be registered for component accounts, got {account}")]
    NotComponent { account: String },

    #[error("Component {account} already has a custody receiver")]
    ReceiverExists { account: String },

    #[error("Nested custody operation refused")]
    Reentrancy,
}

impl CustodyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AssetNotFound { .. } => ErrorCode::AssetNotFound,
            Self::AssetExists { .. } => ErrorCode::AssetExists,
            Self::NotOwner { .. } => ErrorCode::NotOwner,
            Self::RecipientCannotReceive { .. } => ErrorCode::RecipientCannotReceive,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::NotComponent { .. } | Self::ReceiverExists { .. } => ErrorCode::InvalidConfig,
            Self::Reentrancy => ErrorCode::Reentrancy,
        }
    }
}

pub type Result<T> = std::result::Result<T, CustodyError>;

/// Answer of a component to an incoming custody transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveAck {
    Accepted,
    Rejected { reason: String },
}

/// Acceptance handshake for component accounts.
///
/// A component declares it can hold non-fungible custody by registering an
/// implementation for its account. The hook runs after ownership has been
/// recorded; a rejection rolls the transfer back.
#[async_trait]
pub trait CustodyReceiver: Send + Sync {
    async fn on_custody_received(
        &self,
        from: Option<&AccountId>,
        asset_id: AssetId,
    ) -> ReceiveAck;
}

/// How an asset came into existence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MintSource {
    /// Seeded at initialization
    Genesis,
    /// Minted for a verified allowlist claim
    Claim,
}

/// Ownership record for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: AssetId,
    pub owner: AccountId,
    pub source: MintSource,
    pub minted_at: DateTime<Utc>,
    pub transfer_count: u64,
}

/// Capability to mint assets, granted by the custody admin
#[derive(Debug, Clone)]
pub struct MintAuthority {
    id: Uuid,
    holder: AccountId,
    source: MintSource,
}

impl MintAuthority {
    pub fn holder(&self) -> &AccountId {
        &self.holder
    }
}

#[derive(Debug, Default)]
struct CustodyState {
    assets: HashMap<AssetId, AssetRecord>,
    minters: HashMap<Uuid, AccountId>,
}

/// The asset custody registry
#[derive(Clone)]
pub struct AssetCustody {
    admin: AccountId,
    state: Arc<RwLock<CustodyState>>,
    receivers: Arc<RwLock<HashMap<AccountId, Arc<dyn CustodyReceiver>>>>,
    op_guard: OpGuard,
}

impl AssetCustody {
    /// Create an empty registry administered by `admin`
    pub fn new(admin: AccountId) -> Self {
        Self {
            admin,
            state: Arc::new(RwLock::new(CustodyState::default())),
            receivers: Arc::new(RwLock::new(HashMap::new())),
            op_guard: OpGuard::new(),
        }
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    /// Guard that engines built on this registry derive their own from
    pub fn op_guard(&self) -> &OpGuard {
        &self.op_guard
    }

    /// Grant `holder` the right to mint. Only the admin may grant.
    pub async fn grant_mint_authority(
        &self,
        caller: &AccountId,
        holder: AccountId,
        source: MintSource,
    ) -> Result<MintAuthority> {
        if caller != &self.admin {
            warn!(%caller, "Rejected mint authority grant");
            return Err(CustodyError::Unauthorized {
                caller: caller.to_string(),
            });
        }

        let authority = MintAuthority {
            id: Uuid::new_v4(),
            holder: holder.clone(),
            source,
        };
        self.state
            .write()
            .await
            .minters
            .insert(authority.id, holder.clone());
        info!(%holder, "Mint authority granted");
        Ok(authority)
    }

    /// Declare that a component account accepts custody. A component's
    /// receiver cannot be replaced once registered.
    pub async fn register_receiver(
        &self,
        account: AccountId,
        receiver: Arc<dyn CustodyReceiver>,
    ) -> Result<()> {
        if !account.is_component() {
            return Err(CustodyError::NotComponent {
                account: account.to_string(),
            });
        }
        let mut receivers = self.receivers.write().await;
        if receivers.contains_key(&account) {
            warn!(%account, "Custody receiver already registered");
            return Err(CustodyError::ReceiverExists {
                account: account.to_string(),
            });
        }
        debug!(%account, "Custody receiver registered");
        receivers.insert(account, receiver);
        Ok(())
    }

    /// Mint a new asset to `to`
    pub async fn mint(
        &self,
        authority: &MintAuthority,
        to: &AccountId,
        asset_id: AssetId,
    ) -> Result<AssetRecord> {
        self.op_guard
            .run(self.mint_inner(authority, to, asset_id), || CustodyError::Reentrancy)
            .await
    }

    async fn mint_inner(
        &self,
        authority: &MintAuthority,
        to: &AccountId,
        asset_id: AssetId,
    ) -> Result<AssetRecord> {
        let record = {
            let mut state = self.state.write().await;
            if state.minters.get(&authority.id) != Some(&authority.holder) {
                return Err(CustodyError::Unauthorized {
                    caller: authority.holder.to_string(),
                });
            }
            if state.assets.contains_key(&asset_id) {
                return Err(CustodyError::AssetExists { asset_id });
            }

            let record = AssetRecord {
                asset_id,
                owner: to.clone(),
                source: authority.source.clone(),
                minted_at: Utc::now(),
                transfer_count: 0,
            };
            state.assets.insert(asset_id, record.clone());
            record
        };

        if let Err(e) = self.handshake(None, to, asset_id).await {
            self.state.write().await.assets.remove(&asset_id);
            return Err(e);
        }

        info!(%asset_id, owner = %to, "Asset minted");
        Ok(record)
    }

    /// Move custody of `asset_id` from `from` to `to`
    pub async fn transfer_custody(
        &self,
        from: &AccountId,
        to: &AccountId,
        asset_id: AssetId,
    ) -> Result<AssetRecord> {
        self.op_guard
            .run(self.transfer_inner(from, to, asset_id), || CustodyError::Reentrancy)
            .await
    }

    async fn transfer_inner(
        &self,
        from: &AccountId,
        to: &AccountId,
        asset_id: AssetId,
    ) -> Result<AssetRecord> {
        let record = {
            let mut state = self.state.write().await;
            let record = state
                .assets
                .get_mut(&asset_id)
                .ok_or(CustodyError::AssetNotFound { asset_id })?;
            if &record.owner != from {
                warn!(%asset_id, caller = %from, "Transfer by non-owner rejected");
                return Err(CustodyError::NotOwner {
                    asset_id,
                    caller: from.to_string(),
                });
            }
            record.owner = to.clone();
            record.transfer_count += 1;
            record.clone()
        };

        if let Err(e) = self.handshake(Some(from), to, asset_id).await {
            let mut state = self.state.write().await;
            if let Some(record) = state.assets.get_mut(&asset_id) {
                record.owner = from.clone();
                record.transfer_count -= 1;
            }
            return Err(e);
        }

        info!(%asset_id, %from, %to, "Custody transferred");
        Ok(record)
    }

    /// Acceptance check for component recipients; principals always accept
    async fn handshake(
        &self,
        from: Option<&AccountId>,
        to: &AccountId,
        asset_id: AssetId,
    ) -> Result<()> {
        if !to.is_component() {
            return Ok(());
        }

        let receiver = self.receivers.read().await.get(to).cloned();
        let ack = match receiver {
            Some(receiver) => receiver.on_custody_received(from, asset_id).await,
            None => ReceiveAck::Rejected {
                reason: "no custody receiver registered".to_string(),
            },
        };

        match ack {
            ReceiveAck::Accepted => Ok(()),
            ReceiveAck::Rejected { reason } => {
                warn!(recipient = %to, %asset_id, %reason, "Custody handshake failed");
                Err(CustodyError::RecipientCannotReceive {
                    recipient: to.to_string(),
                    reason,
                })
            }
        }
    }

    pub async fn owner_of(&self, asset_id: AssetId) -> Option<AccountId> {
        let state = self.state.read().await;
        state.assets.get(&asset_id).map(|r| r.owner.clone())
    }

    pub async fn asset(&self, asset_id: AssetId) -> Option<AssetRecord> {
        self.state.read().await.assets.get(&asset_id).cloned()
    }

    /// All asset ids currently owned by `account`, ascending
    pub async fn assets_of(&self, account: &AccountId) -> Vec<AssetId> {
        let state = self.state.read().await;
        let mut ids: Vec<AssetId> = state
            .assets
            .values()
            .filter(|r| &r.owner == account)
            .map(|r| r.asset_id)
            .collect();
        ids.sort();
        ids
    }

    pub async fn total_minted(&self) -> usize {
        self.state.read().await.assets.len()
    }
}
