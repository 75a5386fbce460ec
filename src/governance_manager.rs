use std::collections::HashMap;
use std::sync::RwLock;

use crate::chainparams::ChainParams;
use crate::primitives::{Transaction, TxOut};

/// One governance-approved superblock payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperblockPayment {
    pub script_pubkey: Vec<u8>,
    pub amount: i64,
}

/// Query side of the superblock subsystem. Trigger objects are produced by
/// governance voting, which happens elsewhere; the kernel only consumes the
/// winning payment plans.
#[derive(Debug, Default)]
pub struct GovernanceManager {
    triggers: RwLock<HashMap<u32, Vec<SuperblockPayment>>>,
}

impl GovernanceManager {
    pub fn new() -> Self {
        GovernanceManager::default()
    }

    /// Record the winning trigger for a superblock height.
    pub fn add_superblock_trigger(&self, height: u32, payments: Vec<SuperblockPayment>) {
        let mut triggers = self.triggers.write().unwrap();
        log::info!(
            "superblock trigger at height {} with {} payments",
            height,
            payments.len()
        );
        triggers.insert(height, payments);
    }

    pub fn is_valid_superblock_height(params: &ChainParams, height: u32) -> bool {
        height >= params.superblock_start_block && height % params.superblock_cycle == 0
    }

    pub fn is_superblock_triggered(&self, params: &ChainParams, height: u32) -> bool {
        if !Self::is_valid_superblock_height(params, height) {
            return false;
        }
        self.triggers.read().unwrap().contains_key(&height)
    }

    /// Maximum extra value a superblock may create on top of the block
    /// reward. Zero away from superblock heights.
    pub fn get_payments_limit(params: &ChainParams, height: u32) -> i64 {
        if Self::is_valid_superblock_height(params, height) {
            params.superblock_payment_limit
        } else {
            0
        }
    }

    pub fn get_superblock_payments(&self, height: u32) -> Vec<TxOut> {
        let triggers = self.triggers.read().unwrap();
        triggers
            .get(&height)
            .map(|payments| {
                payments
                    .iter()
                    .map(|p| TxOut::new(p.amount, p.script_pubkey.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check the coinbase/coinstake against the triggered payment plan: each
    /// approved payout must appear verbatim and the plan must fit the limit.
    pub fn is_valid(
        &self,
        params: &ChainParams,
        tx: &Transaction,
        height: u32,
        _block_reward: i64,
    ) -> bool {
        let triggers = self.triggers.read().unwrap();
        let payments = match triggers.get(&height) {
            Some(p) => p,
            None => {
                log::error!("superblock validity check with no trigger at height {}", height);
                return false;
            }
        };
        let total: i64 = payments.iter().map(|p| p.amount).sum();
        if total > Self::get_payments_limit(params, height) {
            log::error!(
                "superblock at height {} pays {} over limit {}",
                height,
                total,
                Self::get_payments_limit(params, height)
            );
            return false;
        }
        for payment in payments {
            let found = tx
                .vout
                .iter()
                .any(|out| out.value == payment.amount && out.script_pubkey == payment.script_pubkey);
            if !found {
                log::error!(
                    "superblock at height {} missing payment {} to {}",
                    height,
                    payment.amount,
                    hex::encode(&payment.script_pubkey)
                );
                return false;
            }
        }
        true
    }

    /// Diagnostic rendering of the payment plan at a height.
    pub fn get_required_payments_string(&self, height: u32) -> String {
        let triggers = self.triggers.read().unwrap();
        match triggers.get(&height) {
            Some(payments) => payments
                .iter()
                .map(|p| format!("{}:{}", hex::encode(&p.script_pubkey), p.amount))
                .collect::<Vec<_>>()
                .join("|"),
            None => "Unknown".to_string(),
        }
    }
}
