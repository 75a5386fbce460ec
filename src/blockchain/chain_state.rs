use std::collections::HashMap;

use crate::blockchain::block_index::BlockIndex;
use crate::primitives::BlockHeader;

/// Branch-aware block tree plus the active chain. Entries live in an arena
/// vector and reference parents by arena index, so forks share ancestry
/// without reference cycles and snapshots are cheap.
///
/// The struct itself is not synchronized: the owning node wraps it in the
/// chain lock and validators run against `&ChainState` under a shared read.
#[derive(Debug, Default)]
pub struct ChainState {
    entries: Vec<BlockIndex>,
    index_by_hash: HashMap<[u8; 32], u32>,
    /// Arena index of the active-chain entry at each height.
    active: Vec<u32>,
}

impl ChainState {
    pub fn new() -> Self {
        ChainState::default()
    }

    /// Add a header to the tree. The parent must already be indexed unless
    /// this is the genesis header (null prev hash). Returns the arena index,
    /// or the existing one if the header is already known.
    pub fn add_block_index(&mut self, header: BlockHeader) -> Option<u32> {
        let hash = header.block_hash();
        if let Some(&idx) = self.index_by_hash.get(&hash) {
            return Some(idx);
        }
        let (prev, height) = if header.prev_block_hash == [0u8; 32] {
            (None, 0)
        } else {
            match self.index_by_hash.get(&header.prev_block_hash) {
                Some(&prev_idx) => (Some(prev_idx), self.entries[prev_idx as usize].height + 1),
                None => {
                    log::warn!(
                        "add_block_index: orphan header {} with unknown parent {}",
                        hex::encode(hash),
                        hex::encode(header.prev_block_hash)
                    );
                    return None;
                }
            }
        };
        let idx = self.entries.len() as u32;
        self.entries.push(BlockIndex::new(header, height, prev));
        self.index_by_hash.insert(hash, idx);
        log::debug!(
            "add_block_index: height={} hash={}",
            height,
            hex::encode(hash)
        );
        Some(idx)
    }

    pub fn index_of(&self, hash: &[u8; 32]) -> Option<u32> {
        self.index_by_hash.get(hash).copied()
    }

    pub fn entry(&self, idx: u32) -> &BlockIndex {
        &self.entries[idx as usize]
    }

    pub fn entry_mut(&mut self, idx: u32) -> &mut BlockIndex {
        &mut self.entries[idx as usize]
    }

    pub fn by_hash(&self, hash: &[u8; 32]) -> Option<&BlockIndex> {
        self.index_of(hash).map(|idx| self.entry(idx))
    }

    pub fn parent(&self, entry: &BlockIndex) -> Option<&BlockIndex> {
        entry.prev.map(|idx| self.entry(idx))
    }

    /// Active-chain entry at the given height.
    pub fn at_height(&self, height: u32) -> Option<&BlockIndex> {
        self.active.get(height as usize).map(|&idx| self.entry(idx))
    }

    /// Whether the entry lies on the active chain.
    pub fn contains(&self, entry: &BlockIndex) -> bool {
        self.active
            .get(entry.height as usize)
            .map(|&idx| self.entries[idx as usize].hash == entry.hash)
            .unwrap_or(false)
    }

    /// Successor of an active-chain entry, by height.
    pub fn next_on_active(&self, entry: &BlockIndex) -> Option<&BlockIndex> {
        if !self.contains(entry) {
            return None;
        }
        self.at_height(entry.height + 1)
    }

    pub fn next_on_active_index(&self, idx: u32) -> Option<u32> {
        let entry = self.entry(idx);
        if !self.contains(entry) {
            return None;
        }
        self.active.get(entry.height as usize + 1).copied()
    }

    pub fn tip(&self) -> Option<&BlockIndex> {
        self.active.last().map(|&idx| self.entry(idx))
    }

    pub fn height(&self) -> Option<u32> {
        self.tip().map(|t| t.height)
    }

    /// Rebuild the active chain so it ends at the given tip, walking parent
    /// links back to genesis.
    pub fn set_best_chain(&mut self, tip_hash: &[u8; 32]) -> bool {
        let tip_idx = match self.index_of(tip_hash) {
            Some(idx) => idx,
            None => return false,
        };
        let mut path = Vec::with_capacity(self.entry(tip_idx).height as usize + 1);
        let mut cursor = Some(tip_idx);
        while let Some(idx) = cursor {
            path.push(idx);
            cursor = self.entry(idx).prev;
        }
        path.reverse();
        self.active = path;
        let tip = self.entry(tip_idx);
        log::info!(
            "new chain tip: height={} hash={}",
            tip.height,
            hex::encode(tip.hash)
        );
        true
    }
}
