//! Lending logic behind the proxy
//!
//! `ProtocolState` is the durable part of the protocol: the component ledgers.
//! A `LendingLogic` is the replaceable part: how caller operations are applied
//! to that state. Each operation has a default body with the standard
//! behavior, so an upgraded logic only overrides what it changes.

use async_trait::async_trait;
use loanbook_claims::{ClaimRecord, ClaimRegistry};
use loanbook_collateral::{CollateralLedger, CollateralPosition};
use loanbook_custody::{AssetCustody, AssetRecord};
use loanbook_debt::DebtTokenLedger;
use loanbook_types::{AccountId, Amount, AssetId, Digest};

use crate::Result;

/// The component ledgers. Survives logic upgrades untouched.
#[derive(Clone)]
pub struct ProtocolState {
    pub custody: AssetCustody,
    pub debt: DebtTokenLedger,
    pub claims: ClaimRegistry,
    pub collateral: CollateralLedger,
}

#[async_trait]
pub trait LendingLogic: Send + Sync {
    /// Version string reported by the protocol
    fn version(&self) -> String;

    async fn deposit_collateral(
        &self,
        state: &ProtocolState,
        caller: &AccountId,
        asset_id: AssetId,
    ) -> Result<CollateralPosition> {
        Ok(state.collateral.deposit_collateral(caller, asset_id).await?)
    }

    async fn withdraw_collateral(
        &self,
        state: &ProtocolState,
        caller: &AccountId,
        asset_id: AssetId,
    ) -> Result<CollateralPosition> {
        Ok(state.collateral.withdraw_collateral(caller, asset_id).await?)
    }

    async fn get_loan(
        &self,
        state: &ProtocolState,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<CollateralPosition> {
        Ok(state.collateral.get_loan(caller, amount).await?)
    }

    async fn return_loan(
        &self,
        state: &ProtocolState,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<CollateralPosition> {
        Ok(state.collateral.return_loan(caller, amount).await?)
    }

    async fn claim(
        &self,
        state: &ProtocolState,
        caller: &AccountId,
        asset_id: AssetId,
        proof: &[Digest],
    ) -> Result<ClaimRecord> {
        Ok(state.claims.claim(caller, asset_id, proof).await?)
    }

    async fn transfer_asset(
        &self,
        state: &ProtocolState,
        caller: &AccountId,
        to: &AccountId,
        asset_id: AssetId,
    ) -> Result<AssetRecord> {
        Ok(state.custody.transfer_custody(caller, to, asset_id).await?)
    }
}

/// The logic installed at genesis
#[derive(Debug, Clone)]
pub struct StandardLogic {
    version: String,
}

impl StandardLogic {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Default for StandardLogic {
    fn default() -> Self {
        Self::new("1.0.0")
    }
}

#[async_trait]
impl LendingLogic for StandardLogic {
    fn version(&self) -> String {
        self.version.clone()
    }
}
