//! The collateral ledger

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use loanbook_custody::{AssetCustody, OpGuard};
use loanbook_debt::{DebtMinter, DebtTokenLedger};
use loanbook_types::{AccountId, Amount, AssetId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    CollateralError, CollateralEvent, CollateralEventRecord, CollateralPosition, Result,
    VaultReceiver,
};

/// Configuration for the collateral engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Component account that holds deposited assets and mints debt
    pub vault_account: AccountId,
    /// Value credited per deposited asset
    pub collateral_unit: Amount,
}

impl Default for CollateralConfig {
    fn default() -> Self {
        Self {
            vault_account: AccountId::component("collateral-vault"),
            collateral_unit: Amount::new(2),
        }
    }
}

#[derive(Debug, Default)]
struct CollateralState {
    positions: HashMap<AccountId, CollateralPosition>,
    /// asset id -> account that deposited it
    depositors: HashMap<AssetId, AccountId>,
    events: Vec<CollateralEventRecord>,
}

impl CollateralState {
    fn push_event(&mut self, event: CollateralEvent) {
        let sequence = self.events.len() as u64;
        self.events.push(CollateralEventRecord {
            sequence,
            event,
            recorded_at: Utc::now(),
        });
    }

    fn position(&self, account: &AccountId) -> CollateralPosition {
        self.positions.get(account).cloned().unwrap_or_default()
    }

    fn restore(&mut self, account: &AccountId, before: CollateralPosition) {
        if before == CollateralPosition::default() {
            self.positions.remove(account);
        } else {
            self.positions.insert(account.clone(), before);
        }
    }
}

/// The collateral/loan accounting engine
///
/// Mutating calls run one at a time under an operation guard shared with
/// custody. Each call writes its bookkeeping, releases the state lock for
/// the outbound custody or debt call, and restores the bookkeeping if that
/// call fails. Queries made from inside a receive hook see the pending
/// bookkeeping.
#[derive(Clone)]
pub struct CollateralLedger {
    config: CollateralConfig,
    custody: AssetCustody,
    debt: DebtTokenLedger,
    minter: DebtMinter,
    receiver: VaultReceiver,
    state: Arc<RwLock<CollateralState>>,
    op_guard: OpGuard,
}

impl CollateralLedger {
    /// Build the engine over `custody` and `debt`. `minter` is the
    /// capability returned when the debt ledger bound its minter.
    pub fn new(
        config: CollateralConfig,
        custody: AssetCustody,
        debt: DebtTokenLedger,
        minter: DebtMinter,
    ) -> Self {
        let op_guard = custody.op_guard().sibling();
        Self {
            config,
            custody,
            debt,
            minter,
            receiver: VaultReceiver::default(),
            state: Arc::new(RwLock::new(CollateralState::default())),
            op_guard,
        }
    }

    pub fn config(&self) -> &CollateralConfig {
        &self.config
    }

    pub fn vault_account(&self) -> &AccountId {
        &self.config.vault_account
    }

    pub fn collateral_unit(&self) -> Amount {
        self.config.collateral_unit
    }

    pub fn debt_ledger(&self) -> &DebtTokenLedger {
        &self.debt
    }

    pub fn custody(&self) -> &AssetCustody {
        &self.custody
    }

    /// Declare the vault's receive capability to custody. Until this runs,
    /// every deposit fails with `RecipientCannotReceive`.
    pub async fn register_with_custody(&self) -> Result<()> {
        self.custody
            .register_receiver(
                self.config.vault_account.clone(),
                Arc::new(self.receiver.clone()),
            )
            .await?;
        Ok(())
    }

    /// Move `asset_id` from `account` into the vault and credit one
    /// collateral unit.
    pub async fn deposit_collateral(&self, account: &AccountId, asset_id: AssetId) -> Result<CollateralPosition> {
        self.op_guard
            .run(self.deposit_inner(account, asset_id), || CollateralError::Reentrancy)
            .await
    }

    async fn deposit_inner(&self, account: &AccountId, asset_id: AssetId) -> Result<CollateralPosition> {
        let unit = self.config.collateral_unit;

        let (before, new_total) = {
            let mut state = self.state.write().await;
            let before = state.position(account);
            let new_total = before
                .total_collateral
                .checked_add(unit)
                .ok_or_else(|| CollateralError::Overflow {
                    message: format!("total collateral of {}", account),
                })?;

            let position = state.positions.entry(account.clone()).or_default();
            position.total_collateral = new_total;
            position.deposited.insert(asset_id);
            state.depositors.insert(asset_id, account.clone());
            (before, new_total)
        };

        self.receiver.expect(account.clone(), asset_id).await;
        let transfer = self
            .custody
            .transfer_custody(account, &self.config.vault_account, asset_id)
            .await;
        self.receiver.clear().await;

        let mut state = self.state.write().await;
        if let Err(e) = transfer {
            state.restore(account, before);
            state.depositors.remove(&asset_id);
            warn!(%account, %asset_id, error = %e, "Deposit rejected");
            return Err(e.into());
        }

        state.push_event(CollateralEvent::Deposited {
            account: account.clone(),
            asset_id,
            credited: unit,
        });
        info!(%account, %asset_id, total = %new_total, "Collateral deposited");
        Ok(state.position(account))
    }

    /// Issue a loan of `amount` against the account's headroom
    pub async fn get_loan(&self, account: &AccountId, amount: Amount) -> Result<CollateralPosition> {
        self.op_guard
            .run(self.get_loan_inner(account, amount), || CollateralError::Reentrancy)
            .await
    }

    async fn get_loan_inner(&self, account: &AccountId, amount: Amount) -> Result<CollateralPosition> {
        if amount.is_zero() {
            return Err(CollateralError::InvalidAmount {
                message: "Loan amount must be greater than zero".to_string(),
            });
        }

        let (before, new_used) = {
            let mut state = self.state.write().await;
            let before = state.position(account);

            // headroom is only computed once total >= used is established
            let available = before.headroom().unwrap_or_default();
            if before.total_collateral < before.used_collateral || available < amount {
                warn!(%account, %amount, headroom = %available, "Loan rejected");
                return Err(CollateralError::InsufficientCollateral {
                    available: available.0,
                    requested: amount.0,
                });
            }
            let new_used = before
                .used_collateral
                .checked_add(amount)
                .ok_or_else(|| CollateralError::Overflow {
                    message: format!("used collateral of {}", account),
                })?;

            state.positions.entry(account.clone()).or_default().used_collateral = new_used;
            (before, new_used)
        };

        let minted = self
            .debt
            .mint(&self.minter, account, amount, "loan issued")
            .await;

        let mut state = self.state.write().await;
        if let Err(e) = minted {
            state.restore(account, before);
            warn!(%account, %amount, error = %e, "Debt mint failed, loan rolled back");
            return Err(e.into());
        }

        state.push_event(CollateralEvent::LoanIssued {
            account: account.clone(),
            amount,
        });
        info!(%account, %amount, used = %new_used, "Loan issued");
        Ok(state.position(account))
    }

    /// Repay `amount` of debt, releasing the same amount of used collateral
    pub async fn return_loan(&self, account: &AccountId, amount: Amount) -> Result<CollateralPosition> {
        self.op_guard
            .run(self.return_loan_inner(account, amount), || CollateralError::Reentrancy)
            .await
    }

    async fn return_loan_inner(&self, account: &AccountId, amount: Amount) -> Result<CollateralPosition> {
        if amount.is_zero() {
            return Err(CollateralError::InvalidAmount {
                message: "Repayment amount must be greater than zero".to_string(),
            });
        }

        let balance = self.debt.balance_of(account).await;
        if balance < amount {
            warn!(%account, %amount, %balance, "Repayment exceeds debt balance");
            return Err(CollateralError::InsufficientBalance {
                available: balance.0,
                required: amount.0,
            });
        }

        let (before, new_used) = {
            let mut state = self.state.write().await;
            let before = state.position(account);
            let new_used = before
                .used_collateral
                .checked_sub(amount)
                .ok_or_else(|| CollateralError::Underflow {
                    message: format!(
                        "repaying {} against {} used collateral",
                        amount, before.used_collateral
                    ),
                })?;

            state.positions.entry(account.clone()).or_default().used_collateral = new_used;
            (before, new_used)
        };

        let burned = self
            .debt
            .burn(&self.minter, account, amount, "loan repaid")
            .await;

        let mut state = self.state.write().await;
        if let Err(e) = burned {
            state.restore(account, before);
            warn!(%account, %amount, error = %e, "Debt burn failed, repayment rolled back");
            return Err(e.into());
        }

        state.push_event(CollateralEvent::LoanRepaid {
            account: account.clone(),
            amount,
        });
        info!(%account, %amount, used = %new_used, "Loan repaid");
        Ok(state.position(account))
    }

    /// Return a deposited asset, if the remaining collateral still covers
    /// the account's used collateral.
    pub async fn withdraw_collateral(&self, account: &AccountId, asset_id: AssetId) -> Result<CollateralPosition> {
        self.op_guard
            .run(self.withdraw_inner(account, asset_id), || CollateralError::Reentrancy)
            .await
    }

    async fn withdraw_inner(&self, account: &AccountId, asset_id: AssetId) -> Result<CollateralPosition> {
        let unit = self.config.collateral_unit;

        let (before, new_total) = {
            let mut state = self.state.write().await;
            if state.depositors.get(&asset_id) != Some(account) {
                return Err(CollateralError::NotDepositor {
                    asset_id,
                    account: account.to_string(),
                });
            }

            let before = state.position(account);
            let new_total = before
                .total_collateral
                .checked_sub(unit)
                .ok_or_else(|| CollateralError::Underflow {
                    message: format!("total collateral of {}", account),
                })?;
            if before.used_collateral > new_total {
                warn!(%account, %asset_id, used = %before.used_collateral, "Withdrawal would exceed headroom");
                return Err(CollateralError::InsufficientCollateral {
                    available: before.headroom().unwrap_or_default().0,
                    requested: unit.0,
                });
            }

            let position = state.positions.entry(account.clone()).or_default();
            position.total_collateral = new_total;
            position.deposited.remove(&asset_id);
            state.depositors.remove(&asset_id);
            (before, new_total)
        };

        let transfer = self
            .custody
            .transfer_custody(&self.config.vault_account, account, asset_id)
            .await;

        let mut state = self.state.write().await;
        if let Err(e) = transfer {
            state.restore(account, before);
            state.depositors.insert(asset_id, account.clone());
            warn!(%account, %asset_id, error = %e, "Withdrawal transfer failed, rolled back");
            return Err(e.into());
        }

        state.push_event(CollateralEvent::Withdrawn {
            account: account.clone(),
            asset_id,
            debited: unit,
        });
        info!(%account, %asset_id, total = %new_total, "Collateral withdrawn");
        Ok(state.position(account))
    }

    pub async fn position(&self, account: &AccountId) -> CollateralPosition {
        self.state.read().await.position(account)
    }

    pub async fn total_collateral(&self, account: &AccountId) -> Amount {
        self.position(account).await.total_collateral
    }

    pub async fn used_collateral(&self, account: &AccountId) -> Amount {
        self.position(account).await.used_collateral
    }

    pub async fn headroom(&self, account: &AccountId) -> Amount {
        self.position(account).await.headroom().unwrap_or_default()
    }

    pub async fn depositor_of(&self, asset_id: AssetId) -> Option<AccountId> {
        self.state.read().await.depositors.get(&asset_id).cloned()
    }

    pub async fn events(&self) -> Vec<CollateralEventRecord> {
        self.state.read().await.events.clone()
    }

    pub async fn all_accounts(&self) -> Vec<AccountId> {
        let state = self.state.read().await;
        let mut accounts: Vec<AccountId> = state.positions.keys().cloned().collect();
        accounts.sort();
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use loanbook_custody::{CustodyReceiver, MintAuthority, MintSource, ReceiveAck};
    use loanbook_types::ErrorCode;

    struct Fixture {
        ledger: CollateralLedger,
        custody: AssetCustody,
        genesis: MintAuthority,
    }

    async fn fixture(unit: u64, register: bool) -> Fixture {
        let admin = AccountId::principal("admin");
        let custody = AssetCustody::new(admin.clone());
        let genesis = custody
            .grant_mint_authority(&admin, admin.clone(), MintSource::Genesis)
            .await
            .unwrap();
        let debt = DebtTokenLedger::default();
        let config = CollateralConfig {
            collateral_unit: Amount::new(unit),
            ..Default::default()
        };
        let minter = debt.bind_minter(config.vault_account.clone()).unwrap();
        let ledger = CollateralLedger::new(config, custody.clone(), debt, minter);
        if register {
            ledger.register_with_custody().await.unwrap();
        }
        Fixture {
            ledger,
            custody,
            genesis,
        }
    }

    impl Fixture {
        async fn give(&self, account: &AccountId, id: u64) {
            self.custody.mint(&self.genesis, account, AssetId(id)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_deposit_credits_one_unit() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;

        let position = f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();

        assert_eq!(position.total_collateral, Amount::new(2));
        assert_eq!(position.used_collateral, Amount::zero());
        assert!(position.deposited.contains(&AssetId(1)));
        assert_eq!(f.custody.owner_of(AssetId(1)).await, Some(f.ledger.vault_account().clone()));
        assert_eq!(f.ledger.depositor_of(AssetId(1)).await, Some(alice));
    }

    #[tokio::test]
    async fn test_deposit_without_receive_capability() {
        let f = fixture(2, false).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;

        let result = f.ledger.deposit_collateral(&alice, AssetId(1)).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::RecipientCannotReceive);
        assert_eq!(f.ledger.total_collateral(&alice).await, Amount::zero());
        assert_eq!(f.ledger.depositor_of(AssetId(1)).await, None);
        assert_eq!(f.custody.owner_of(AssetId(1)).await, Some(alice));
        assert!(f.ledger.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_deposit_of_foreign_asset() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        let bob = AccountId::principal("bob");
        f.give(&alice, 1).await;

        let result = f.ledger.deposit_collateral(&bob, AssetId(1)).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::NotOwner);
        assert_eq!(f.ledger.total_collateral(&bob).await, Amount::zero());
        assert!(f.ledger.all_accounts().await.is_empty());
    }

    #[tokio::test]
    async fn test_stray_transfer_into_vault_rejected() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;

        let result = f
            .custody
            .transfer_custody(&alice, f.ledger.vault_account(), AssetId(1))
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::RecipientCannotReceive);
    }

    #[tokio::test]
    async fn test_zero_collateral_cannot_borrow() {
        let f = fixture(2, true).await;
        let carol = AccountId::principal("carol");

        let result = f.ledger.get_loan(&carol, Amount::new(3)).await;

        assert_eq!(
            result.unwrap_err(),
            CollateralError::InsufficientCollateral { available: 0, requested: 3 }
        );
        assert_eq!(f.ledger.debt_ledger().balance_of(&carol).await, Amount::zero());
        assert_eq!(f.ledger.used_collateral(&carol).await, Amount::zero());
    }

    #[tokio::test]
    async fn test_borrow_within_headroom() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;
        f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();

        let position = f.ledger.get_loan(&alice, Amount::new(2)).await.unwrap();
        assert_eq!(position.used_collateral, Amount::new(2));
        assert_eq!(f.ledger.debt_ledger().balance_of(&alice).await, Amount::new(2));

        let result = f.ledger.get_loan(&alice, Amount::new(1)).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::InsufficientCollateral);
        assert_eq!(f.ledger.headroom(&alice).await, Amount::zero());
    }

    #[tokio::test]
    async fn test_zero_loan_rejected() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");

        let result = f.ledger.get_loan(&alice, Amount::zero()).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidAmount);
    }

    #[tokio::test]
    async fn test_deposit_borrow_repay_scenario() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;

        f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();
        f.ledger.get_loan(&alice, Amount::new(2)).await.unwrap();
        let position = f.ledger.return_loan(&alice, Amount::new(1)).await.unwrap();

        assert_eq!(position.used_collateral, Amount::new(1));
        assert_eq!(f.ledger.debt_ledger().balance_of(&alice).await, Amount::new(1));
        assert_eq!(f.ledger.headroom(&alice).await, Amount::new(1));
    }

    #[tokio::test]
    async fn test_repay_more_than_balance() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;
        f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();
        f.ledger.get_loan(&alice, Amount::new(1)).await.unwrap();

        let result = f.ledger.return_loan(&alice, Amount::new(2)).await;

        assert_eq!(
            result.unwrap_err(),
            CollateralError::InsufficientBalance { available: 1, required: 2 }
        );
        assert_eq!(f.ledger.used_collateral(&alice).await, Amount::new(1));
    }

    #[tokio::test]
    async fn test_repay_without_debt() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");

        let result = f.ledger.return_loan(&alice, Amount::new(1)).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::InsufficientBalance);
    }

    #[tokio::test]
    async fn test_withdraw_requires_free_headroom() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;
        f.give(&alice, 2).await;
        f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();
        f.ledger.deposit_collateral(&alice, AssetId(2)).await.unwrap();
        f.ledger.get_loan(&alice, Amount::new(3)).await.unwrap();

        let result = f.ledger.withdraw_collateral(&alice, AssetId(1)).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::InsufficientCollateral);
        assert_eq!(f.ledger.total_collateral(&alice).await, Amount::new(4));

        f.ledger.return_loan(&alice, Amount::new(1)).await.unwrap();
        let position = f.ledger.withdraw_collateral(&alice, AssetId(1)).await.unwrap();

        assert_eq!(position.total_collateral, Amount::new(2));
        assert_eq!(position.used_collateral, Amount::new(2));
        assert_eq!(f.custody.owner_of(AssetId(1)).await, Some(alice));
    }

    #[tokio::test]
    async fn test_withdraw_by_non_depositor() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        let bob = AccountId::principal("bob");
        f.give(&alice, 1).await;
        f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();

        let result = f.ledger.withdraw_collateral(&bob, AssetId(1)).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::NotDepositor);
    }

    #[tokio::test]
    async fn test_used_never_exceeds_total() {
        let f = fixture(3, true).await;
        let alice = AccountId::principal("alice");
        for id in 1..=3 {
            f.give(&alice, id).await;
            f.ledger.deposit_collateral(&alice, AssetId(id)).await.unwrap();
        }

        for amount in [4u64, 7, 1, 5] {
            let _ = f.ledger.get_loan(&alice, Amount::new(amount)).await;
            let _ = f.ledger.return_loan(&alice, Amount::new(2)).await;
            let _ = f.ledger.withdraw_collateral(&alice, AssetId(amount % 3 + 1)).await;
            let position = f.ledger.position(&alice).await;
            assert!(position.used_collateral <= position.total_collateral);
        }
    }

    #[tokio::test]
    async fn test_debt_mint_failure_rolls_back_loan() {
        let admin = AccountId::principal("admin");
        let custody = AssetCustody::new(admin.clone());
        let genesis = custody
            .grant_mint_authority(&admin, admin.clone(), MintSource::Genesis)
            .await
            .unwrap();
        // the engine holds a minter issued by a different debt ledger
        let debt = DebtTokenLedger::default();
        debt.bind_minter(AccountId::component("collateral-vault")).unwrap();
        let stale = DebtTokenLedger::default()
            .bind_minter(AccountId::component("collateral-vault"))
            .unwrap();
        let ledger = CollateralLedger::new(CollateralConfig::default(), custody.clone(), debt, stale);
        ledger.register_with_custody().await.unwrap();

        let alice = AccountId::principal("alice");
        custody.mint(&genesis, &alice, AssetId(1)).await.unwrap();
        ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();

        let result = ledger.get_loan(&alice, Amount::new(1)).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::Unauthorized);
        assert_eq!(ledger.used_collateral(&alice).await, Amount::zero());
        assert_eq!(ledger.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_event_log() {
        let f = fixture(2, true).await;
        let alice = AccountId::principal("alice");
        f.give(&alice, 1).await;

        f.ledger.deposit_collateral(&alice, AssetId(1)).await.unwrap();
        f.ledger.get_loan(&alice, Amount::new(2)).await.unwrap();
        f.ledger.return_loan(&alice, Amount::new(2)).await.unwrap();
        f.ledger.withdraw_collateral(&alice, AssetId(1)).await.unwrap();

        let events = f.ledger.events().await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].sequence, 3);
        assert!(matches!(events[1].event, CollateralEvent::LoanIssued { .. }));
        assert!(matches!(events[3].event, CollateralEvent::Withdrawn { .. }));
        assert_eq!(f.ledger.position(&alice).await, CollateralPosition::default());
    }

    /// Component depositor whose hook calls back into the engine while the
    /// vault is returning its asset
    struct Fund {
        ledger: CollateralLedger,
        seen_total: std::sync::Mutex<Option<Amount>>,
        nested_loan: std::sync::Mutex<Option<Result<CollateralPosition>>>,
    }

    fn fund_account() -> AccountId {
        AccountId::component("fund")
    }

    #[async_trait]
    impl CustodyReceiver for Fund {
        async fn on_custody_received(&self, from: Option<&AccountId>, _: AssetId) -> ReceiveAck {
            if from == Some(self.ledger.vault_account()) {
                let total = self.ledger.total_collateral(&fund_account()).await;
                *self.seen_total.lock().unwrap() = Some(total);
                let nested = self.ledger.get_loan(&fund_account(), Amount::new(1)).await;
                *self.nested_loan.lock().unwrap() = Some(nested);
            }
            ReceiveAck::Accepted
        }
    }

    #[tokio::test]
    async fn test_withdraw_to_component_hook_can_query() {
        let f = fixture(2, true).await;
        let fund = Arc::new(Fund {
            ledger: f.ledger.clone(),
            seen_total: std::sync::Mutex::new(None),
            nested_loan: std::sync::Mutex::new(None),
        });
        f.custody.register_receiver(fund_account(), fund.clone()).await.unwrap();
        f.give(&fund_account(), 1).await;
        f.give(&fund_account(), 2).await;
        f.ledger.deposit_collateral(&fund_account(), AssetId(1)).await.unwrap();
        f.ledger.deposit_collateral(&fund_account(), AssetId(2)).await.unwrap();

        let position = tokio::time::timeout(
            Duration::from_secs(5),
            f.ledger.withdraw_collateral(&fund_account(), AssetId(1)),
        )
        .await
        .expect("withdrawal did not complete")
        .unwrap();

        assert_eq!(position.total_collateral, Amount::new(2));
        assert_eq!(*fund.seen_total.lock().unwrap(), Some(Amount::new(2)));
        assert_eq!(f.custody.owner_of(AssetId(1)).await, Some(fund_account()));
    }

    #[tokio::test]
    async fn test_nested_loan_from_hook_refused() {
        let f = fixture(2, true).await;
        let fund = Arc::new(Fund {
            ledger: f.ledger.clone(),
            seen_total: std::sync::Mutex::new(None),
            nested_loan: std::sync::Mutex::new(None),
        });
        f.custody.register_receiver(fund_account(), fund.clone()).await.unwrap();
        f.give(&fund_account(), 1).await;
        f.give(&fund_account(), 2).await;
        f.ledger.deposit_collateral(&fund_account(), AssetId(1)).await.unwrap();
        f.ledger.deposit_collateral(&fund_account(), AssetId(2)).await.unwrap();

        f.ledger.withdraw_collateral(&fund_account(), AssetId(1)).await.unwrap();

        let nested = fund.nested_loan.lock().unwrap().take();
        assert!(matches!(nested, Some(Err(CollateralError::Reentrancy))));
        assert_eq!(f.ledger.used_collateral(&fund_account()).await, Amount::zero());
        assert_eq!(f.ledger.debt_ledger().balance_of(&fund_account()).await, Amount::zero());

        // the engine accepts calls again once the withdrawal is done
        f.ledger.get_loan(&fund_account(), Amount::new(1)).await.unwrap();
        assert_eq!(f.ledger.used_collateral(&fund_account()).await, Amount::new(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrowers_all_served() {
        let f = fixture(1_000, true).await;
        let borrowers: Vec<AccountId> = (0..16)
            .map(|i| AccountId::principal(format!("borrower-{}", i)))
            .collect();
        for (i, borrower) in borrowers.iter().enumerate() {
            f.give(borrower, i as u64).await;
            f.ledger.deposit_collateral(borrower, AssetId(i as u64)).await.unwrap();
        }

        let mut handles = Vec::new();
        for borrower in borrowers.iter().cloned() {
            let ledger = f.ledger.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..200 {
                    ledger.get_loan(&borrower, Amount::new(1)).await?;
                    ledger.return_loan(&borrower, Amount::new(1)).await?;
                    ledger.get_loan(&borrower, Amount::new(1)).await?;
                }
                Ok::<_, CollateralError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for borrower in &borrowers {
            assert_eq!(f.ledger.used_collateral(borrower).await, Amount::new(200));
            assert_eq!(f.ledger.debt_ledger().balance_of(borrower).await, Amount::new(200));
        }
        assert_eq!(f.ledger.debt_ledger().total_supply().await, Amount::new(16 * 200));
        assert_eq!(f.ledger.events().await.len(), 16 + 16 * 600);
    }
}
