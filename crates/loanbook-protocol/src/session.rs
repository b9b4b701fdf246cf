//! Caller-authenticated boundary
//!
//! A `Session` carries the caller identity into every operation, so no
//! operation can act on behalf of an account other than the one that opened
//! the session.

use loanbook_claims::ClaimRecord;
use loanbook_collateral::CollateralPosition;
use loanbook_custody::AssetRecord;
use loanbook_types::{AccountId, Amount, AssetId, Digest};
use tracing::debug;

use crate::{Protocol, Result};

pub struct Session<'a> {
    protocol: &'a Protocol,
    caller: AccountId,
}

impl<'a> Session<'a> {
    pub(crate) fn new(protocol: &'a Protocol, caller: AccountId) -> Self {
        Self { protocol, caller }
    }

    pub fn caller(&self) -> &AccountId {
        &self.caller
    }

    pub async fn deposit_collateral(&self, asset_id: AssetId) -> Result<CollateralPosition> {
        debug!(caller = %self.caller, %asset_id, "deposit_collateral");
        let logic = self.protocol.proxy().current().await;
        logic
            .deposit_collateral(self.protocol.state(), &self.caller, asset_id)
            .await
    }

    pub async fn withdraw_collateral(&self, asset_id: AssetId) -> Result<CollateralPosition> {
        debug!(caller = %self.caller, %asset_id, "withdraw_collateral");
        let logic = self.protocol.proxy().current().await;
        logic
            .withdraw_collateral(self.protocol.state(), &self.caller, asset_id)
            .await
    }

    pub async fn get_loan(&self, amount: Amount) -> Result<CollateralPosition> {
        debug!(caller = %self.caller, %amount, "get_loan");
        let logic = self.protocol.proxy().current().await;
        logic.get_loan(self.protocol.state(), &self.caller, amount).await
    }

    pub async fn return_loan(&self, amount: Amount) -> Result<CollateralPosition> {
        debug!(caller = %self.caller, %amount, "return_loan");
        let logic = self.protocol.proxy().current().await;
        logic.return_loan(self.protocol.state(), &self.caller, amount).await
    }

    pub async fn claim(&self, asset_id: AssetId, proof: &[Digest]) -> Result<ClaimRecord> {
        debug!(caller = %self.caller, %asset_id, proof_len = proof.len(), "claim");
        let logic = self.protocol.proxy().current().await;
        logic
            .claim(self.protocol.state(), &self.caller, asset_id, proof)
            .await
    }

    /// Move an asset the caller owns to `to`
    pub async fn transfer_asset(&self, to: &AccountId, asset_id: AssetId) -> Result<AssetRecord> {
        debug!(caller = %self.caller, %to, %asset_id, "transfer_asset");
        let logic = self.protocol.proxy().current().await;
        logic
            .transfer_asset(self.protocol.state(), &self.caller, to, asset_id)
            .await
    }
}
