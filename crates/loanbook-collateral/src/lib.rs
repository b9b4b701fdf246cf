//! Loanbook Collateral - The collateral/loan accounting engine
//!
//! Per account, the engine tracks:
//! - `total_collateral`: value credited for assets held in custody
//! - `used_collateral`: the part of that value locked against debt
//!
//! Loans are issued only against headroom (`total - used`) and repayments
//! release exactly the repaid amount. Debt tokens are minted and burned in
//! the debt ledger, where this engine is the sole bound minter.
//!
//! # Invariants
//!
//! 1. `used_collateral <= total_collateral` for every account
//! 2. An account with no collateral can never borrow
//! 3. Bookkeeping is written before any outbound call, and restored if
//!    that call fails
//! 4. Mutating calls run one at a time; a nested call from inside a
//!    receive hook is rejected

pub mod engine;
pub mod position;
pub mod receiver;

pub use engine::*;
pub use position::*;
pub use receiver::*;

use loanbook_custody::CustodyError;
use loanbook_debt::DebtError;
use loanbook_types::{AssetId, ErrorCode};
use thiserror::Error;

/// Errors that can occur in collateral operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollateralError {
    #[error("Insufficient collateral: headroom {available}, requested {requested}")]
    InsufficientCollateral { available: u64, requested: u64 },

    #[error("Insufficient debt balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Arithmetic underflow: {message}")]
    Underflow { message: String },

    #[error("Arithmetic overflow: {message}")]
    Overflow { message: String },

    #[error("{account} did not deposit asset {asset_id}")]
    NotDepositor { asset_id: AssetId, account: String },

    #[error("Nested collateral operation refused")]
    Reentrancy,

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Debt ledger error: {0}")]
    Debt(#[from] DebtError),
}

impl CollateralError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InsufficientCollateral { .. } => ErrorCode::InsufficientCollateral,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            Self::Underflow { .. } => ErrorCode::Underflow,
            Self::Overflow { .. } => ErrorCode::Overflow,
            Self::NotDepositor { .. } => ErrorCode::NotDepositor,
            Self::Reentrancy => ErrorCode::Reentrancy,
            Self::Custody(e) => e.code(),
            Self::Debt(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollateralError>;
