//! Loanbook Crypto - Hash commitments for one-time asset claims
//!
//! This crate provides:
//! - Hashing (SHA-256)
//! - Claim leaf derivation: `sha256(account || asset_id)`
//! - Merkle tree construction and proof generation
//! - Proof verification against a committed root
//!
//! # Verification Invariant
//!
//! **`verify_proof` is pure and total.** It never panics and never fails
//! other than by returning `false`.

pub mod hash;
pub mod merkle;

pub use hash::*;
pub use merkle::*;

use loanbook_types::ErrorCode;
use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Cannot build a Merkle tree without leaves")]
    EmptyTree,

    #[error("Leaf index {index} out of range for {leaves} leaves")]
    LeafIndexOutOfRange { index: usize, leaves: usize },
}

impl CryptoError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidConfig
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
