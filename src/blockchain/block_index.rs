use crate::primitives::BlockHeader;

// Index flag bits. The entropy bit lives in the flags so that the stake
// modifier checksum covers it.
pub const BLOCK_PROOF_OF_STAKE: u32 = 1 << 0;
pub const BLOCK_STAKE_ENTROPY: u32 = 1 << 1;
pub const BLOCK_STAKE_MODIFIER: u32 = 1 << 2;

/// One node of the block tree. Entries live in the `ChainState` arena and
/// reference their parent by arena index, never destroyed once connected.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub hash: [u8; 32],
    pub prev: Option<u32>,
    pub height: u32,
    pub header: BlockHeader,

    pub flags: u32,
    /// Valid iff `BLOCK_STAKE_MODIFIER` is set in `flags`.
    pub stake_modifier: u64,
    /// Valid for PoS entries; the block hash substitutes for PoW entries
    /// wherever a proof hash is needed as selection input.
    pub hash_proof_of_stake: [u8; 32],
    pub stake_modifier_checksum: u32,
}

impl BlockIndex {
    pub fn new(header: BlockHeader, height: u32, prev: Option<u32>) -> Self {
        let hash = header.block_hash();
        let mut flags = 0;
        // Entropy bit: bit 0 of the block hash as a little-endian integer.
        if hash[0] & 1 == 1 {
            flags |= BLOCK_STAKE_ENTROPY;
        }
        BlockIndex {
            hash,
            prev,
            height,
            header,
            flags,
            stake_modifier: 0,
            hash_proof_of_stake: [0u8; 32],
            stake_modifier_checksum: 0,
        }
    }

    pub fn block_time(&self) -> i64 {
        self.header.block_time()
    }

    pub fn bits(&self) -> u32 {
        self.header.bits
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_PROOF_OF_STAKE != 0
    }

    pub fn set_proof_of_stake(&mut self) {
        self.flags |= BLOCK_PROOF_OF_STAKE;
    }

    pub fn generated_stake_modifier(&self) -> bool {
        self.flags & BLOCK_STAKE_MODIFIER != 0
    }

    pub fn stake_entropy_bit(&self) -> u64 {
        ((self.flags & BLOCK_STAKE_ENTROPY) != 0) as u64
    }

    pub fn set_stake_modifier(&mut self, modifier: u64, generated: bool) {
        self.stake_modifier = modifier;
        if generated {
            self.flags |= BLOCK_STAKE_MODIFIER;
        }
    }

    /// Proof hash used as selection input: the PoS proof for stake blocks,
    /// the block hash itself for work blocks.
    pub fn selection_proof(&self) -> [u8; 32] {
        if self.is_proof_of_stake() {
            self.hash_proof_of_stake
        } else {
            self.hash
        }
    }
}
