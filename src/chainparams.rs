use crate::script::KeyId;

/// One coin in base units.
pub const COIN: i64 = 100_000_000;

/// Consensus parameters. Read-only after startup; every kernel and payment
/// function takes these explicitly instead of touching globals.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network_id_string: &'static str,

    // Stake modifier / kernel
    pub modifier_interval: i64,
    pub modifier_interval_ratio: i64,
    pub pos_target_spacing: i64,
    pub stake_min_age: i64,
    pub stake_max_age: i64,
    pub minimum_stake_value: i64,
    pub coin_unit: i64,

    // Payment layer
    pub generation_height: u32,
    pub generation_amount: i64,
    pub last_pow_block: u32,
    pub superblock_start_block: u32,
    pub superblock_cycle: u32,
    pub superblock_payment_limit: i64,
    /// Masternode share of the block reward, as num/den.
    pub masternode_reward_num: i64,
    pub masternode_reward_den: i64,

    pub genesis_hash: [u8; 32],
    /// Spork key-ids; the first is the generation-height recipient.
    pub spork_addresses: Vec<KeyId>,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        let mut genesis_hash = [0u8; 32];
        hex::decode_to_slice(
            "b8b4c37a5cefe9b65a03aee5d4b39cbf8a9e0f2d1f4b30ae85b17b7c86e9c700",
            &mut genesis_hash,
        )
        .expect("static genesis hash");

        let mut spork_key_id = [0u8; 20];
        hex::decode_to_slice(
            "9f21ac6b3c07d84aa3e5e6c1f025ee1fb3a7e0c4",
            &mut spork_key_id,
        )
        .expect("static spork key id");

        ChainParams {
            network_id_string: "mainnet",

            modifier_interval: 60,
            modifier_interval_ratio: 3,
            pos_target_spacing: 60,
            stake_min_age: 60 * 60,
            stake_max_age: 60 * 60 * 24 * 30,
            minimum_stake_value: 10_000 * COIN,
            coin_unit: COIN,

            generation_height: 250,
            generation_amount: 21_000_000 * COIN,
            last_pow_block: 200,
            superblock_start_block: 1_000,
            superblock_cycle: 43_200,
            superblock_payment_limit: 100_000 * COIN,
            masternode_reward_num: 1,
            masternode_reward_den: 2,

            genesis_hash,
            spork_addresses: vec![spork_key_id],
        }
    }

    /// Portion of the block reward owed to the winning masternode.
    pub fn masternode_payment(&self, _height: u32, block_reward: i64) -> i64 {
        block_reward * self.masternode_reward_num / self.masternode_reward_den
    }
}
