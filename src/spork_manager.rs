use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

// Spork IDs, numbered as on the wire.
pub const SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT: i32 = 10007;
pub const SPORK_9_SUPERBLOCKS_ENABLED: i32 = 10008;
pub const SPORK_15_DETERMINISTIC_MNS_ENABLED: i32 = 10014;

const ALL_SPORK_IDS: [i32; 3] = [
    SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT,
    SPORK_9_SUPERBLOCKS_ENABLED,
    SPORK_15_DETERMINISTIC_MNS_ENABLED,
];

// Default values are activation timestamps; anything far in the future is
// effectively OFF until a signed spork update lands.
const SPORK_OFF: i64 = 4_070_908_800; // 2099-01-01

fn default_spork_value(spork_id: i32) -> Option<i64> {
    match spork_id {
        SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT => Some(0),
        SPORK_9_SUPERBLOCKS_ENABLED => Some(SPORK_OFF),
        SPORK_15_DETERMINISTIC_MNS_ENABLED => Some(SPORK_OFF),
        _ => None,
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SporkDetail {
    pub id: i32,
    pub name: String,
    pub value: Option<i64>,
    pub active: bool,
}

/// Read side of the spork subsystem. Message processing and signature
/// verification live with the network layer; the consensus kernel only ever
/// asks whether a policy flag is active.
#[derive(Debug, Default)]
pub struct SporkManager {
    active_sporks: RwLock<HashMap<i32, i64>>,
}

impl SporkManager {
    pub fn new() -> Self {
        SporkManager::default()
    }

    /// Record a spork value received (and verified) by the network layer.
    pub fn set_spork(&self, spork_id: i32, value: i64) {
        let mut sporks = self.active_sporks.write().unwrap();
        log::info!("spork {} set to {}", spork_id, value);
        sporks.insert(spork_id, value);
    }

    pub fn get_spork_value(&self, spork_id: i32) -> Option<i64> {
        let sporks = self.active_sporks.read().unwrap();
        sporks
            .get(&spork_id)
            .copied()
            .or_else(|| default_spork_value(spork_id))
    }

    /// A spork is active once its value (an activation timestamp) has passed.
    pub fn is_spork_active_at(&self, spork_id: i32, now: i64) -> bool {
        match self.get_spork_value(spork_id) {
            Some(value) => value < now,
            None => {
                log::warn!(
                    "spork {} has no stored value and no default; assuming inactive",
                    spork_id
                );
                false
            }
        }
    }

    pub fn is_spork_active(&self, spork_id: i32) -> bool {
        self.is_spork_active_at(spork_id, chrono::Utc::now().timestamp())
    }

    pub fn spork_name_by_id(&self, id: i32) -> String {
        match id {
            SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT => {
                "SPORK_8_MASTERNODE_PAYMENT_ENFORCEMENT".to_string()
            }
            SPORK_9_SUPERBLOCKS_ENABLED => "SPORK_9_SUPERBLOCKS_ENABLED".to_string(),
            SPORK_15_DETERMINISTIC_MNS_ENABLED => "SPORK_15_DETERMINISTIC_MNS_ENABLED".to_string(),
            _ => format!("UNKNOWN_SPORK_{}", id),
        }
    }

    pub fn get_all_spork_details(&self) -> Vec<SporkDetail> {
        ALL_SPORK_IDS
            .iter()
            .map(|&id| SporkDetail {
                id,
                name: self.spork_name_by_id(id),
                value: self.get_spork_value(id),
                active: self.is_spork_active(id),
            })
            .collect()
    }
}
