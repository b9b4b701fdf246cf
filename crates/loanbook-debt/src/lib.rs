//! Loanbook Debt - Fungible debt token ledger
//!
//! The debt ledger is:
//! - Account-keyed by AccountId
//! - Minter-gated (only the holder of the `DebtMinter` issued at binding
//!   may mint or burn)
//! - Supply-conserving (total supply equals the sum of balances)
//! - Append-only (every mint/burn leaves a journal entry)
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. The minter is bound once and never changes
//! 3. Arithmetic never wraps
//! 4. Failed operations leave balances untouched

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use loanbook_types::{AccountId, Amount, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors that can occur in debt ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebtError {
    #[error("Unauthorized minter: {caller}")]
    Unauthorized { caller: String },

    #[error("Minter already bound to {minter}")]
    MinterAlreadyBound { minter: String },

    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Balance overflow")]
    Overflow,
}

impl DebtError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::MinterAlreadyBound { .. } => ErrorCode::MinterAlreadyBound,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            Self::Overflow => ErrorCode::Overflow,
        }
    }
}

pub type Result<T> = std::result::Result<T, DebtError>;

/// Unique identifier for a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new() -> Self {
        Self(format!("entry_{}", Uuid::new_v4()))
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Mint,
    Burn,
}

/// A single journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtEntry {
    pub entry_id: EntryId,
    pub account: AccountId,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub balance_after: Amount,
    pub memo: String,
    pub created_at: DateTime<Utc>,
}

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtTokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for DebtTokenConfig {
    fn default() -> Self {
        Self {
            name: "Loanbook Debt".to_string(),
            symbol: "LDEBT".to_string(),
            decimals: 0,
        }
    }
}

/// Capability to mint and burn, issued once by `bind_minter`
#[derive(Debug, Clone)]
pub struct DebtMinter {
    id: Uuid,
    holder: AccountId,
}

impl DebtMinter {
    pub fn holder(&self) -> &AccountId {
        &self.holder
    }
}

#[derive(Debug, Default)]
struct DebtState {
    balances: HashMap<AccountId, Amount>,
    total_supply: Amount,
    entries: Vec<DebtEntry>,
}

/// The debt token ledger
#[derive(Clone)]
pub struct DebtTokenLedger {
    config: DebtTokenConfig,
    minter: Arc<OnceLock<(Uuid, AccountId)>>,
    state: Arc<RwLock<DebtState>>,
}

impl DebtTokenLedger {
    /// Create an empty ledger with no minter bound
    pub fn new(config: DebtTokenConfig) -> Self {
        Self {
            config,
            minter: Arc::new(OnceLock::new()),
            state: Arc::new(RwLock::new(DebtState::default())),
        }
    }

    pub fn config(&self) -> &DebtTokenConfig {
        &self.config
    }

    /// Bind the sole minter and hand back its capability. Succeeds once.
    pub fn bind_minter(&self, holder: AccountId) -> Result<DebtMinter> {
        let minter = DebtMinter {
            id: Uuid::new_v4(),
            holder,
        };
        self.minter
            .set((minter.id, minter.holder.clone()))
            .map_err(|_| DebtError::MinterAlreadyBound {
                minter: self
                    .minter()
                    .map(|m| m.to_string())
                    .unwrap_or_default(),
            })?;
        info!(minter = %minter.holder, symbol = %self.config.symbol, "Debt minter bound");
        Ok(minter)
    }

    /// Account holding the minter capability, if bound
    pub fn minter(&self) -> Option<&AccountId> {
        self.minter.get().map(|(_, holder)| holder)
    }

    fn authorize(&self, minter: &DebtMinter) -> Result<()> {
        match self.minter.get() {
            Some((id, holder)) if *id == minter.id && holder == &minter.holder => Ok(()),
            _ => {
                warn!(caller = %minter.holder, "Unauthorized debt ledger call");
                Err(DebtError::Unauthorized {
                    caller: minter.holder.to_string(),
                })
            }
        }
    }

    /// Mint `amount` to `account`. Returns the new balance and the entry ID.
    pub async fn mint(
        &self,
        minter: &DebtMinter,
        account: &AccountId,
        amount: Amount,
        memo: impl Into<String>,
    ) -> Result<(Amount, EntryId)> {
        self.authorize(minter)?;
        if amount.is_zero() {
            return Err(DebtError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }

        let mut state = self.state.write().await;

        let current = state.balances.get(account).copied().unwrap_or_default();
        let new_balance = current.checked_add(amount).ok_or(DebtError::Overflow)?;
        let new_supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(DebtError::Overflow)?;

        state.balances.insert(account.clone(), new_balance);
        state.total_supply = new_supply;

        let entry_id = Self::record(&mut state, account, EntryType::Mint, amount, new_balance, memo);
        info!(%account, %amount, balance = %new_balance, "Debt minted");
        Ok((new_balance, entry_id))
    }

    /// Burn `amount` from `account`. Fails if the balance would go negative.
    pub async fn burn(
        &self,
        minter: &DebtMinter,
        account: &AccountId,
        amount: Amount,
        memo: impl Into<String>,
    ) -> Result<(Amount, EntryId)> {
        self.authorize(minter)?;
        if amount.is_zero() {
            return Err(DebtError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }

        let mut state = self.state.write().await;

        let current = state.balances.get(account).copied().unwrap_or_default();
        let new_balance =
            current
                .checked_sub(amount)
                .ok_or(DebtError::InsufficientBalance {
                    available: current.0,
                    required: amount.0,
                })?;
        // supply >= any single balance, so this only fails on a broken ledger
        let new_supply = state
            .total_supply
            .checked_sub(amount)
            .ok_or(DebtError::InsufficientBalance {
                available: state.total_supply.0,
                required: amount.0,
            })?;

        state.balances.insert(account.clone(), new_balance);
        state.total_supply = new_supply;

        let entry_id = Self::record(&mut state, account, EntryType::Burn, amount, new_balance, memo);
        info!(%account, %amount, balance = %new_balance, "Debt burned");
        Ok((new_balance, entry_id))
    }

    fn record(
        state: &mut DebtState,
        account: &AccountId,
        entry_type: EntryType,
        amount: Amount,
        balance_after: Amount,
        memo: impl Into<String>,
    ) -> EntryId {
        let entry = DebtEntry {
            entry_id: EntryId::new(),
            account: account.clone(),
            entry_type,
            amount,
            balance_after,
            memo: memo.into(),
            created_at: Utc::now(),
        };
        let entry_id = entry.entry_id.clone();
        state.entries.push(entry);
        entry_id
    }

    pub async fn balance_of(&self, account: &AccountId) -> Amount {
        let state = self.state.read().await;
        state.balances.get(account).copied().unwrap_or_default()
    }

    pub async fn total_supply(&self) -> Amount {
        self.state.read().await.total_supply
    }

    /// Get all entries for an account
    pub async fn account_entries(&self, account: &AccountId) -> Vec<DebtEntry> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect()
    }

    /// Get recent entries (newest first)
    pub async fn recent_entries(&self, limit: usize) -> Vec<DebtEntry> {
        let state = self.state.read().await;
        state.entries.iter().rev().take(limit).cloned().collect()
    }

    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

impl Default for DebtTokenLedger {
    fn default() -> Self {
        Self::new(DebtTokenConfig::default())
    }
}
