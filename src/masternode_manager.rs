use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::primitives::OutPoint;

pub type ProTxHash = [u8; 32];

/// One entry of a deterministic masternode list snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicMasternode {
    pub pro_tx_hash: ProTxHash,
    pub collateral_outpoint: OutPoint,
    /// Operator share of the masternode reward, in basis points.
    pub operator_reward: u16,
    pub payout_script: Vec<u8>,
    /// Empty until the operator registers a payout script of their own.
    pub operator_payout_script: Vec<u8>,
    pub last_paid_height: u32,
}

/// Immutable masternode list snapshot, keyed by the block it was built at.
#[derive(Debug, Clone, Default)]
pub struct MasternodeList {
    pub block_hash: [u8; 32],
    masternodes: Vec<Arc<DeterministicMasternode>>,
}

impl MasternodeList {
    pub fn new(block_hash: [u8; 32], masternodes: Vec<Arc<DeterministicMasternode>>) -> Self {
        MasternodeList {
            block_hash,
            masternodes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.masternodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.masternodes.len()
    }

    /// The masternode owed the next payment: longest unpaid first, ProRegTx
    /// hash as the deterministic tie-break.
    pub fn mn_payee(&self) -> Option<Arc<DeterministicMasternode>> {
        self.masternodes
            .iter()
            .min_by_key(|mn| (mn.last_paid_height, mn.pro_tx_hash))
            .cloned()
    }

    /// The next `count` payees in payment order.
    pub fn projected_mn_payees(&self, count: usize) -> Vec<Arc<DeterministicMasternode>> {
        let mut sorted = self.masternodes.clone();
        sorted.sort_by_key(|mn| (mn.last_paid_height, mn.pro_tx_hash));
        sorted.truncate(count);
        sorted
    }
}

/// Cache of deterministic masternode list snapshots. The list contents are
/// maintained by the evo-sync layer; consensus code only reads snapshots.
#[derive(Debug, Default)]
pub struct MasternodeManager {
    lists: RwLock<HashMap<[u8; 32], MasternodeList>>,
    tip_list: RwLock<MasternodeList>,
}

impl MasternodeManager {
    pub fn new() -> Self {
        MasternodeManager::default()
    }

    pub fn update_list(&self, list: MasternodeList) {
        let mut lists = self.lists.write().unwrap();
        log::debug!(
            "masternode list updated for block {} ({} entries)",
            hex::encode(list.block_hash),
            list.len()
        );
        lists.insert(list.block_hash, list);
    }

    pub fn set_tip_list(&self, list: MasternodeList) {
        self.update_list(list.clone());
        *self.tip_list.write().unwrap() = list;
    }

    /// Snapshot at the given block; unknown blocks yield an empty list.
    pub fn list_for_block(&self, block_hash: &[u8; 32]) -> MasternodeList {
        let lists = self.lists.read().unwrap();
        lists.get(block_hash).cloned().unwrap_or_else(|| {
            MasternodeList::new(*block_hash, Vec::new())
        })
    }

    pub fn list_at_tip(&self) -> MasternodeList {
        self.tip_list.read().unwrap().clone()
    }
}
