//! Identity types for Loanbook
//!
//! Accounts are opaque principals keyed by name. A component account is a
//! ledger or engine (such as the collateral vault) rather than an end user;
//! custody transfers into a component must pass an acceptance handshake.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Whether an account is an end user or a system component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// An end-user principal
    Principal,
    /// A ledger/engine component that holds custody on behalf of others
    Component,
}

impl AccountKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Principal => "user",
            Self::Component => "component",
        }
    }
}

/// Unique identifier for an account
///
/// Serialized as its display form (`user:alice`), so config files can name
/// accounts as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId {
    pub kind: AccountKind,
    pub name: String,
}

impl AccountId {
    /// An end-user principal
    pub fn principal(name: impl Into<String>) -> Self {
        Self {
            kind: AccountKind::Principal,
            name: name.into(),
        }
    }

    /// A component account (vault, registry, engine)
    pub fn component(name: impl Into<String>) -> Self {
        Self {
            kind: AccountKind::Component,
            name: name.into(),
        }
    }

    pub fn is_component(&self) -> bool {
        self.kind == AccountKind::Component
    }

    /// Parse `user:<name>` or `component:<name>`. A bare name is a principal.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let (kind, name) = match s.split_once(':') {
            Some(("user", name)) => (AccountKind::Principal, name),
            Some(("component", name)) => (AccountKind::Component, name),
            Some((prefix, _)) => {
                return Err(TypesError::InvalidAccount {
                    message: format!("unknown account prefix '{}'", prefix),
                })
            }
            None => (AccountKind::Principal, s),
        };
        if name.is_empty() {
            return Err(TypesError::InvalidAccount {
                message: "account name is empty".to_string(),
            });
        }
        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }

    /// Canonical byte encoding, used when deriving claim leaves
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.name)
    }
}

impl TryFrom<String> for AccountId {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AccountId> for String {
    fn from(account: AccountId) -> Self {
        account.to_string()
    }
}

impl std::str::FromStr for AccountId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of a non-fungible asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl AssetId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for AssetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
