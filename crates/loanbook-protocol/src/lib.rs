//! Loanbook Protocol - The external surface of the lending ledger
//!
//! `Protocol::genesis` wires the component crates together from a
//! `GenesisConfig`:
//!
//! - `AssetCustody` owns asset ownership records
//! - `DebtTokenLedger` holds debt balances, with the collateral vault as its
//!   only minter
//! - `ClaimRegistry` redeems allowlisted claims against a fixed Merkle root
//! - `CollateralLedger` tracks positions and issues loans against headroom
//!
//! Callers act through a `Session`, which binds every operation to the
//! caller's account. Operations run through the `LendingLogic` currently
//! installed in the `LogicProxy`; the admin can swap that logic while all
//! component state stays in place.

pub mod config;
pub mod logic;
pub mod protocol;
pub mod proxy;
pub mod session;

pub use config::*;
pub use logic::*;
pub use protocol::*;
pub use proxy::*;
pub use session::*;

use loanbook_claims::ClaimError;
use loanbook_collateral::CollateralError;
use loanbook_crypto::CryptoError;
use loanbook_custody::CustodyError;
use loanbook_debt::DebtError;
use loanbook_types::{ErrorCode, TypesError};
use thiserror::Error;

/// Errors surfaced at the protocol boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid genesis config: {message}")]
    InvalidConfig { message: String },

    #[error("Unauthorized: {caller}")]
    Unauthorized { caller: String },

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Debt(#[from] DebtError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Collateral(#[from] CollateralError),
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Types(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Custody(e) => e.code(),
            Self::Debt(e) => e.code(),
            Self::Claim(e) => e.code(),
            Self::Collateral(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
