//! Loanbook Types - Canonical domain types for the collateral lending ledger
//!
//! This crate contains the foundational types shared by every loanbook crate,
//! with zero dependencies on other loanbook crates:
//!
//! - Identity types (`AccountId`, `AssetId`)
//! - The `Amount` unit used for collateral value and debt
//! - `Digest`, the 32-byte hash value used for leaves, proofs and roots
//! - `ErrorCode`, the stable reason code every failure maps to
//!
//! # Invariants
//!
//! 1. Arithmetic on amounts never wraps
//! 2. Component accounts are distinguishable from end-user principals
//! 3. Every failure carries a specific reason code

pub mod identity;
pub mod amount;
pub mod digest;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use digest::*;
pub use error::*;
