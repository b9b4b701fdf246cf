//! The vault's side of the custody handshake
//!
//! The vault only accepts the asset a deposit is currently moving in, from
//! the depositor. Stray transfers into the vault are rejected, so an asset
//! can never sit in custody without a matching collateral credit.

use std::sync::Arc;

use async_trait::async_trait;
use loanbook_custody::{CustodyReceiver, ReceiveAck};
use loanbook_types::{AccountId, AssetId};
use tokio::sync::Mutex;

/// Deposit the engine is currently settling
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingDeposit {
    pub depositor: AccountId,
    pub asset_id: AssetId,
}

#[derive(Clone, Default)]
pub struct VaultReceiver {
    pending: Arc<Mutex<Option<PendingDeposit>>>,
}

impl VaultReceiver {
    pub(crate) async fn expect(&self, depositor: AccountId, asset_id: AssetId) {
        *self.pending.lock().await = Some(PendingDeposit {
            depositor,
            asset_id,
        });
    }

    pub(crate) async fn clear(&self) {
        *self.pending.lock().await = None;
    }
}

#[async_trait]
impl CustodyReceiver for VaultReceiver {
    async fn on_custody_received(
        &self,
        from: Option<&AccountId>,
        asset_id: AssetId,
    ) -> ReceiveAck {
        let pending = self.pending.lock().await;
        match (pending.as_ref(), from) {
            (Some(p), Some(from)) if p.asset_id == asset_id && &p.depositor == from => {
                ReceiveAck::Accepted
            }
            _ => ReceiveAck::Rejected {
                reason: "vault only accepts assets through deposit_collateral".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepts_only_pending_deposit() {
        let receiver = VaultReceiver::default();
        let alice = AccountId::principal("alice");
        let bob = AccountId::principal("bob");

        assert!(matches!(
            receiver.on_custody_received(Some(&alice), AssetId(1)).await,
            ReceiveAck::Rejected { .. }
        ));

        receiver.expect(alice.clone(), AssetId(1)).await;
        assert_eq!(
            receiver.on_custody_received(Some(&alice), AssetId(1)).await,
            ReceiveAck::Accepted
        );
        assert!(matches!(
            receiver.on_custody_received(Some(&bob), AssetId(1)).await,
            ReceiveAck::Rejected { .. }
        ));
        assert!(matches!(
            receiver.on_custody_received(None, AssetId(1)).await,
            ReceiveAck::Rejected { .. }
        ));

        receiver.clear().await;
        assert!(matches!(
            receiver.on_custody_received(Some(&alice), AssetId(1)).await,
            ReceiveAck::Rejected { .. }
        ));
    }
}
