//! Error types for Loanbook
//!
//! Every failure in every crate maps onto one `ErrorCode`, so callers at the
//! boundary get a specific, stable reason for each rejected operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable reason code for a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InsufficientCollateral,
    InsufficientBalance,
    Unauthorized,
    AlreadyClaimed,
    InvalidProof,
    NotOwner,
    RecipientCannotReceive,
    Underflow,
    Overflow,
    InvalidAmount,
    AssetNotFound,
    AssetExists,
    NotDepositor,
    Reentrancy,
    MinterAlreadyBound,
    InvalidConfig,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors from parsing the shared types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid account: {message}")]
    InvalidAccount { message: String },

    #[error("Invalid digest: {message}")]
    InvalidDigest { message: String },
}

impl TypesError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidConfig
    }
}
