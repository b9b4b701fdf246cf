//! Versioned logic proxy with admin-gated upgrades

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loanbook_types::AccountId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{LendingLogic, ProtocolError, Result};

/// A completed logic swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub from_version: String,
    pub to_version: String,
    pub upgraded_by: AccountId,
    pub upgraded_at: DateTime<Utc>,
}

/// Holds the running `LendingLogic`. Only the admin may replace it.
///
/// Operations clone the current logic handle when they start, so an
/// operation already in flight finishes on the logic it began with.
#[derive(Clone)]
pub struct LogicProxy {
    admin: AccountId,
    logic: Arc<RwLock<Arc<dyn LendingLogic>>>,
    history: Arc<RwLock<Vec<UpgradeRecord>>>,
}

impl LogicProxy {
    pub fn new(admin: AccountId, logic: Arc<dyn LendingLogic>) -> Self {
        Self {
            admin,
            logic: Arc::new(RwLock::new(logic)),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    pub async fn current(&self) -> Arc<dyn LendingLogic> {
        self.logic.read().await.clone()
    }

    pub async fn version(&self) -> String {
        self.logic.read().await.version()
    }

    /// Install `logic`. A non-admin caller leaves the running logic in place.
    pub async fn upgrade(
        &self,
        caller: &AccountId,
        logic: Arc<dyn LendingLogic>,
    ) -> Result<UpgradeRecord> {
        if caller != &self.admin {
            warn!(%caller, "Rejected logic upgrade");
            return Err(ProtocolError::Unauthorized {
                caller: caller.to_string(),
            });
        }

        let mut current = self.logic.write().await;
        let record = UpgradeRecord {
            from_version: current.version(),
            to_version: logic.version(),
            upgraded_by: caller.clone(),
            upgraded_at: Utc::now(),
        };
        *current = logic;
        self.history.write().await.push(record.clone());

        info!(
            from = %record.from_version,
            to = %record.to_version,
            "Lending logic upgraded"
        );
        Ok(record)
    }

    /// Upgrades applied so far, oldest first
    pub async fn history(&self) -> Vec<UpgradeRecord> {
        self.history.read().await.clone()
    }
}
