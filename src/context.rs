use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chainparams::ChainParams;
use crate::governance_manager::GovernanceManager;
use crate::masternode_manager::MasternodeManager;
use crate::spork_manager::SporkManager;
use crate::storage::BlockStore;

/// Network-adjusted clock. A trait so validation stays deterministic under
/// test while the node feeds in peer-adjusted wall time.
pub trait AdjustedTime: Send + Sync + std::fmt::Debug {
    fn adjusted_time(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl AdjustedTime for SystemClock {
    fn adjusted_time(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock pinned to a fixed instant.
#[derive(Debug)]
pub struct FixedClock(pub i64);

impl AdjustedTime for FixedClock {
    fn adjusted_time(&self) -> i64 {
        self.0
    }
}

/// Masternode-layer sync progress, flipped by the sync state machine.
#[derive(Debug, Default)]
pub struct MasternodeSync {
    synced: AtomicBool,
}

impl MasternodeSync {
    pub fn new(synced: bool) -> Self {
        MasternodeSync {
            synced: AtomicBool::new(synced),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Relaxed)
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Relaxed);
    }
}

/// Explicit bundle of everything the consensus entry points read besides the
/// chain itself. There is no module-level mutable state anywhere in the
/// kernel; the node builds one of these at startup and hands it down.
#[derive(Debug, Clone)]
pub struct ConsensusContext {
    pub params: ChainParams,
    pub store: Arc<dyn BlockStore>,
    pub spork_manager: Arc<SporkManager>,
    pub masternode_manager: Arc<MasternodeManager>,
    pub governance_manager: Arc<GovernanceManager>,
    pub masternode_sync: Arc<MasternodeSync>,
    pub time: Arc<dyn AdjustedTime>,
    /// Running without masternode/governance data; payee checks are skipped.
    pub lite_mode: bool,
    /// All masternode history is deterministic (no legacy-list blocks left).
    pub full_deterministic_mn_mode: bool,
}

impl ConsensusContext {
    pub fn new(params: ChainParams, store: Arc<dyn BlockStore>) -> Self {
        ConsensusContext {
            params,
            store,
            spork_manager: Arc::new(SporkManager::new()),
            masternode_manager: Arc::new(MasternodeManager::new()),
            governance_manager: Arc::new(GovernanceManager::new()),
            masternode_sync: Arc::new(MasternodeSync::new(false)),
            time: Arc::new(SystemClock),
            lite_mode: false,
            full_deterministic_mn_mode: false,
        }
    }
}
