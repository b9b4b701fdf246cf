//! Per-account collateral positions and the engine's event log

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use loanbook_types::{AccountId, Amount, AssetId};
use serde::{Deserialize, Serialize};

/// Collateral held for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPosition {
    pub total_collateral: Amount,
    pub used_collateral: Amount,
    /// Assets this account has in custody with the engine
    pub deposited: BTreeSet<AssetId>,
}

impl CollateralPosition {
    /// `total - used`, or `None` if the position is inconsistent
    pub fn headroom(&self) -> Option<Amount> {
        self.total_collateral.checked_sub(self.used_collateral)
    }
}

/// Something that changed a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollateralEvent {
    Deposited {
        account: AccountId,
        asset_id: AssetId,
        credited: Amount,
    },
    Withdrawn {
        account: AccountId,
        asset_id: AssetId,
        debited: Amount,
    },
    LoanIssued {
        account: AccountId,
        amount: Amount,
    },
    LoanRepaid {
        account: AccountId,
        amount: Amount,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralEventRecord {
    pub sequence: u64,
    pub event: CollateralEvent,
    pub recorded_at: DateTime<Utc>,
}
