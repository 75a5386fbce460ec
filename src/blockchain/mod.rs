pub mod block_index;
pub mod chain_state;

pub use block_index::BlockIndex;
pub use chain_state::ChainState;
