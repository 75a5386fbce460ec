//! Consensus kernel of the EPM chain: the stake modifier engine and kernel
//! hash verification for hybrid PoS/PoW blocks, and the deterministic
//! masternode payment layer (block value and payee validation).
//!
//! Everything here is a pure function over a [`blockchain::ChainState`] view
//! and a [`context::ConsensusContext`] of collaborators; networking, mempool,
//! wallet and RPC live elsewhere.

pub mod arith;
pub mod blockchain;
pub mod chainparams;
pub mod context;
pub mod error;
pub mod governance_manager;
pub mod kernel;
pub mod masternode_manager;
pub mod masternode_payments;
pub mod primitives;
pub mod script;
pub mod spork_manager;
pub mod storage;
pub mod util;

pub use blockchain::{BlockIndex, ChainState};
pub use chainparams::ChainParams;
pub use context::ConsensusContext;
pub use error::ConsensusError;
pub use kernel::{
    check_proof_of_stake, check_stake_kernel_hash, check_stake_modifier_checkpoints,
    compute_next_stake_modifier, stake_modifier_checksum,
};
pub use masternode_payments::{
    fill_block_payments, get_required_payments_strings, is_block_payee_valid, is_block_value_valid,
};
