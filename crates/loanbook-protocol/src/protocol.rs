//! Genesis and read-only queries

use std::sync::Arc;

use loanbook_claims::{ClaimRecord, ClaimRegistry};
use loanbook_collateral::{CollateralConfig, CollateralEventRecord, CollateralLedger, CollateralPosition};
use loanbook_custody::{AssetCustody, CustodyReceiver, MintSource};
use loanbook_debt::{DebtTokenConfig, DebtTokenLedger};
use loanbook_types::{AccountId, Amount, AssetId, Digest};
use tracing::info;

use crate::{
    GenesisConfig, LendingLogic, LogicProxy, ProtocolState, Result, Session, StandardLogic,
    UpgradeRecord,
};

/// A running lending protocol
pub struct Protocol {
    admin: AccountId,
    state: ProtocolState,
    proxy: LogicProxy,
}

impl Protocol {
    /// Build every component from `config` and install `StandardLogic`
    pub async fn genesis(config: GenesisConfig) -> Result<Self> {
        Self::genesis_with_logic(config, Arc::new(StandardLogic::default())).await
    }

    pub async fn genesis_with_logic(
        config: GenesisConfig,
        logic: Arc<dyn LendingLogic>,
    ) -> Result<Self> {
        config.validate()?;
        let commitment = config.claim_commitment()?;

        let custody = AssetCustody::new(config.admin.clone());
        let seeder = custody
            .grant_mint_authority(&config.admin, config.admin.clone(), MintSource::Genesis)
            .await?;
        for holding in &config.initial_holdings {
            custody.mint(&seeder, &holding.account, holding.asset_id).await?;
        }

        let claim_authority = custody
            .grant_mint_authority(&config.admin, config.claims_account.clone(), MintSource::Claim)
            .await?;
        let claims = ClaimRegistry::new(
            commitment.root,
            commitment.max_proof_len,
            custody.clone(),
            claim_authority,
        );

        let debt = DebtTokenLedger::new(config.debt_token.clone());
        let minter = debt.bind_minter(config.vault_account.clone())?;

        let collateral = CollateralLedger::new(
            CollateralConfig {
                vault_account: config.vault_account.clone(),
                collateral_unit: config.collateral_unit,
            },
            custody.clone(),
            debt.clone(),
            minter,
        );
        collateral.register_with_custody().await?;

        let proxy = LogicProxy::new(config.admin.clone(), logic);
        info!(
            admin = %config.admin,
            root = %commitment.root,
            unit = %config.collateral_unit,
            seeded = config.initial_holdings.len(),
            version = %proxy.version().await,
            "Protocol initialized"
        );

        Ok(Self {
            admin: config.admin,
            state: ProtocolState {
                custody,
                debt,
                claims,
                collateral,
            },
            proxy,
        })
    }

    /// Bind operations to `caller`
    pub fn session(&self, caller: AccountId) -> Session<'_> {
        Session::new(self, caller)
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    pub(crate) fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Give a component account the ability to hold assets. Its receiver
    /// decides on every asset sent to it and cannot be replaced later.
    pub async fn register_component(
        &self,
        account: AccountId,
        receiver: Arc<dyn CustodyReceiver>,
    ) -> Result<()> {
        self.state.custody.register_receiver(account, receiver).await?;
        Ok(())
    }

    pub(crate) fn proxy(&self) -> &LogicProxy {
        &self.proxy
    }

    /// Replace the lending logic. Admin only; state is kept.
    pub async fn upgrade(
        &self,
        caller: &AccountId,
        logic: Arc<dyn LendingLogic>,
    ) -> Result<UpgradeRecord> {
        self.proxy.upgrade(caller, logic).await
    }

    pub async fn version(&self) -> String {
        self.proxy.version().await
    }

    pub async fn upgrade_history(&self) -> Vec<UpgradeRecord> {
        self.proxy.history().await
    }

    pub async fn total_collateral(&self, account: &AccountId) -> Amount {
        self.state.collateral.total_collateral(account).await
    }

    pub async fn used_collateral(&self, account: &AccountId) -> Amount {
        self.state.collateral.used_collateral(account).await
    }

    pub async fn headroom(&self, account: &AccountId) -> Amount {
        self.state.collateral.headroom(account).await
    }

    pub async fn position(&self, account: &AccountId) -> CollateralPosition {
        self.state.collateral.position(account).await
    }

    pub async fn collateral_events(&self) -> Vec<CollateralEventRecord> {
        self.state.collateral.events().await
    }

    /// Debt token balance
    pub async fn balance_of(&self, account: &AccountId) -> Amount {
        self.state.debt.balance_of(account).await
    }

    pub async fn total_debt(&self) -> Amount {
        self.state.debt.total_supply().await
    }

    pub fn debt_token(&self) -> &DebtTokenConfig {
        self.state.debt.config()
    }

    pub async fn owner_of(&self, asset_id: AssetId) -> Option<AccountId> {
        self.state.custody.owner_of(asset_id).await
    }

    pub async fn assets_of(&self, account: &AccountId) -> Vec<AssetId> {
        self.state.custody.assets_of(account).await
    }

    pub async fn is_claimed(&self, asset_id: AssetId) -> bool {
        self.state.claims.is_claimed(asset_id).await
    }

    pub async fn claims(&self) -> Vec<ClaimRecord> {
        self.state.claims.claims().await
    }

    pub fn merkle_root(&self) -> Digest {
        self.state.claims.root()
    }

    pub fn max_proof_len(&self) -> usize {
        self.state.claims.max_proof_len()
    }

    pub fn collateral_unit(&self) -> Amount {
        self.state.collateral.collateral_unit()
    }

    pub fn vault_account(&self) -> &AccountId {
        self.state.collateral.vault_account()
    }
}
