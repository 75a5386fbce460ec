//! Proof-of-stake kernel: stake modifier computation and selection, kernel
//! hash verification, and the per-block modifier checksum.
//!
//! The stake modifier exists so a coin owner cannot precompute the future
//! proofs their output will generate at confirmation time: the output must
//! hash against a modifier assembled later, bit by bit, from blocks selected
//! by entropy the owner does not control. It is recomputed on a fixed time
//! interval rather than every block, which keeps an attacker from grinding
//! extra modifier bits even after generating a run of blocks.

use std::cmp::min;
use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{LittleEndian, WriteBytesExt};
use primitive_types::U256;

use crate::arith::{proof_meets_target, target_from_compact, u256_from_hash};
use crate::blockchain::block_index::BlockIndex;
use crate::blockchain::chain_state::ChainState;
use crate::chainparams::ChainParams;
use crate::context::ConsensusContext;
use crate::error::{ChainIndexError, ConsensusError, IoError, KernelError, ModifierError};
use crate::primitives::{Block, BlockHeader, Decodable, OutPoint, Transaction};
use crate::script::extract_key_id;
use crate::util::sha256d;

/// Hard checkpoints of stake modifier checksums, sealing early history.
const STAKE_MODIFIER_CHECKPOINTS: &[(u32, u32)] = &[(0, 0xfd11f4e7)];

/// Coin-age weight of an interval, net of the minimum age.
pub fn get_weight(params: &ChainParams, interval_beginning: i64, interval_end: i64) -> i64 {
    interval_end - interval_beginning - params.stake_min_age
}

/// Walk back to the most recent generated stake modifier. A chain with no
/// generated modifier yet yields `(0, 0)`.
fn get_last_stake_modifier(chain: &ChainState, pindex: &BlockIndex) -> (u64, i64) {
    let mut cursor = pindex;
    while let Some(parent) = chain.parent(cursor) {
        if cursor.generated_stake_modifier() {
            break;
        }
        cursor = parent;
    }
    if !cursor.generated_stake_modifier() {
        return (0, 0);
    }
    (cursor.stake_modifier, cursor.block_time())
}

/// Duration of one selection round. Later rounds get longer sections, scaled
/// by the interval ratio.
fn selection_interval_section(params: &ChainParams, section: usize) -> i64 {
    assert!(section < 64);
    params.modifier_interval * 63
        / (63 + (63 - section as i64) * (params.modifier_interval_ratio - 1))
}

/// Total length of the 64-round selection window.
pub fn selection_interval(params: &ChainParams) -> i64 {
    (0..64)
        .map(|section| selection_interval_section(params, section))
        .sum()
}

/// Pick one block for the current round: candidates are scanned in sorted
/// order, scored by hashing their proof hash with the previous modifier, and
/// the lowest score wins. PoS candidates have their score shifted down by 32
/// bits so they beat PoW candidates, preserving the chain's
/// energy-efficiency bias.
fn select_block_from_candidates(
    chain: &ChainState,
    sorted_by_timestamp: &[(i64, [u8; 32])],
    selected_blocks: &HashMap<[u8; 32], u32>,
    selection_interval_stop: i64,
    prev_stake_modifier: u64,
) -> Result<Option<u32>, ChainIndexError> {
    let mut selected: Option<u32> = None;
    let mut hash_best = U256::zero();
    for &(block_time, block_hash) in sorted_by_timestamp {
        let idx = chain
            .index_of(&block_hash)
            .ok_or_else(|| ChainIndexError::NotIndexed(hex::encode(block_hash)))?;
        let entry = chain.entry(idx);
        if selected.is_some() && block_time > selection_interval_stop {
            break;
        }
        if selected_blocks.contains_key(&block_hash) {
            continue;
        }
        let mut data = Vec::with_capacity(40);
        data.extend_from_slice(&entry.selection_proof());
        data.write_u64::<LittleEndian>(prev_stake_modifier)
            .expect("vec write");
        let mut hash_selection = u256_from_hash(&sha256d(&data));
        if entry.is_proof_of_stake() {
            hash_selection = hash_selection >> 32u32;
        }
        match selected {
            Some(_) if hash_selection < hash_best => {
                hash_best = hash_selection;
                selected = Some(idx);
            }
            None => {
                hash_best = hash_selection;
                selected = Some(idx);
            }
            _ => {}
        }
    }
    log::trace!("select_block_from_candidates: selection hash={:x}", hash_best);
    Ok(selected)
}

/// Compute the stake modifier anchored at `prev` (the parent of the block
/// under consideration). Returns the modifier and whether a new one was
/// generated; within one modifier interval the previous value is reused.
pub fn compute_next_stake_modifier(
    chain: &ChainState,
    params: &ChainParams,
    prev: Option<&BlockIndex>,
) -> Result<(u64, bool), ConsensusError> {
    let prev = match prev {
        // Genesis block's modifier is 0.
        None => return Ok((0, true)),
        Some(p) => p,
    };

    let (stake_modifier, modifier_time) = get_last_stake_modifier(chain, prev);
    log::debug!(
        "compute_next_stake_modifier: prev modifier=0x{:016x} time={}",
        stake_modifier,
        modifier_time
    );
    if modifier_time / params.modifier_interval >= prev.block_time() / params.modifier_interval {
        return Ok((stake_modifier, false));
    }

    // Gather candidates back through the selection window and sort them by
    // (timestamp, hash) ascending.
    let interval = selection_interval(params);
    let interval_start =
        (prev.block_time() / params.modifier_interval) * params.modifier_interval - interval;
    let mut sorted_by_timestamp: Vec<(i64, [u8; 32])> =
        Vec::with_capacity((64 * params.modifier_interval / params.pos_target_spacing) as usize);
    let mut height_first_candidate = 0u32;
    let mut cursor = Some(prev);
    while let Some(entry) = cursor {
        if entry.block_time() < interval_start {
            height_first_candidate = entry.height + 1;
            break;
        }
        sorted_by_timestamp.push((entry.block_time(), entry.hash));
        cursor = chain.parent(entry);
    }
    sorted_by_timestamp.reverse();
    sorted_by_timestamp.sort();

    // Select up to 64 blocks, one per round; each winner contributes its
    // entropy bit to the new modifier.
    let mut stake_modifier_new: u64 = 0;
    let mut selection_interval_stop = interval_start;
    let mut selected_blocks: HashMap<[u8; 32], u32> = HashMap::new();
    let rounds = min(64, sorted_by_timestamp.len());
    for round in 0..rounds {
        selection_interval_stop += selection_interval_section(params, round);
        let winner_idx = select_block_from_candidates(
            chain,
            &sorted_by_timestamp,
            &selected_blocks,
            selection_interval_stop,
            stake_modifier,
        )?
        .ok_or(ModifierError::Indeterminate(round))?;
        let winner = chain.entry(winner_idx);
        stake_modifier_new |= winner.stake_entropy_bit() << round;
        selected_blocks.insert(winner.hash, winner_idx);
        log::trace!(
            "compute_next_stake_modifier: selected round {} stop={} height={} bit={}",
            round,
            selection_interval_stop,
            winner.height,
            winner.stake_entropy_bit()
        );
    }

    if log::log_enabled!(log::Level::Debug) {
        // '-' PoW unselected, '=' PoS unselected, 'W'/'S' selected.
        let len = (prev.height - height_first_candidate + 1) as usize;
        let mut selection_map = vec![b'-'; len];
        let mut entry = Some(prev);
        while let Some(e) = entry {
            if e.height < height_first_candidate {
                break;
            }
            if e.is_proof_of_stake() {
                selection_map[(e.height - height_first_candidate) as usize] = b'=';
            }
            entry = chain.parent(e);
        }
        for &idx in selected_blocks.values() {
            let e = chain.entry(idx);
            selection_map[(e.height - height_first_candidate) as usize] =
                if e.is_proof_of_stake() { b'S' } else { b'W' };
        }
        log::debug!(
            "compute_next_stake_modifier: selection height [{}, {}] map {}",
            height_first_candidate,
            prev.height,
            String::from_utf8_lossy(&selection_map)
        );
    }

    Ok((stake_modifier_new, true))
}

/// Resolve the stake modifier to mix into a kernel proof: the modifier in
/// force one full selection interval after the staked coin's block.
///
/// `prev` may sit on a non-active branch, so a temporary forward path is
/// built from it back to the active chain and consumed in place of
/// active-chain successors, keeping the walk deterministic across branches.
///
/// `Ok(None)` is the soft "not ready yet" outcome: the chain does not reach
/// far enough past `block_from` and the wall-clock window has not elapsed.
fn get_kernel_stake_modifier(
    chain: &ChainState,
    params: &ChainParams,
    prev: &BlockIndex,
    hash_block_from: &[u8; 32],
    adjusted_time: i64,
) -> Result<Option<(u64, u32, i64)>, ConsensusError> {
    let from_idx = chain
        .index_of(hash_block_from)
        .ok_or_else(|| ChainIndexError::NotIndexed(hex::encode(hash_block_from)))?;
    let from = chain.entry(from_idx);
    let mut stake_modifier_height = from.height;
    let mut stake_modifier_time = from.block_time();
    let interval = selection_interval(params);

    // Forward iteration cannot rely on the active chain's successors when
    // prev is on a branch; collect the branch segment, earliest first. The
    // depth bound keeps the -1 that lets the path apply from block_from
    // itself.
    let depth = prev.height as i64 - (from.height as i64 - 1);
    let mut tmp_chain: Vec<u32> = Vec::new();
    let mut it = chain.index_of(&prev.hash);
    let mut i = 1i64;
    while i <= depth {
        let idx = match it {
            Some(idx) => idx,
            None => break,
        };
        if chain.contains(chain.entry(idx)) {
            break;
        }
        tmp_chain.push(idx);
        it = chain.entry(idx).prev;
        i += 1;
    }
    tmp_chain.reverse();
    let mut n = 0usize;

    let mut pindex_idx = from_idx;
    while stake_modifier_time < from.block_time() + interval {
        let old_idx = pindex_idx;
        let use_tmp_chain = !tmp_chain.is_empty()
            && chain.entry(pindex_idx).height as i64
                >= chain.entry(tmp_chain[0]).height as i64 - 1;
        let next_idx = if use_tmp_chain {
            let next = tmp_chain.get(n).copied();
            n += 1;
            next
        } else {
            chain.next_on_active_index(pindex_idx)
        };
        match next_idx {
            None => {
                // Reached the best block; may happen when the node is behind.
                let old = chain.entry(old_idx);
                if old.block_time() + params.stake_min_age - interval > adjusted_time {
                    return Err(ChainIndexError::BeyondTip {
                        hash: hex::encode(old.hash),
                        height: old.height,
                        from: hex::encode(hash_block_from),
                    }
                    .into());
                }
                return Ok(None);
            }
            Some(idx) => {
                pindex_idx = idx;
                let entry = chain.entry(idx);
                if entry.generated_stake_modifier() {
                    stake_modifier_height = entry.height;
                    stake_modifier_time = entry.block_time();
                }
            }
        }
    }
    Ok(Some((
        chain.entry(pindex_idx).stake_modifier,
        stake_modifier_height,
        stake_modifier_time,
    )))
}

/// Coin-age weight window: capped at max-age minus min-age.
pub(crate) fn stake_time_weight(params: &ChainParams, time_tx: u32, time_block_from: u32) -> i64 {
    min(
        time_tx as i64 - time_block_from as i64,
        params.stake_max_age - params.stake_min_age,
    )
}

/// Verify the kernel hash inequality for a prospective stake.
///
/// `Ok(None)` propagates the resolver's soft "not ready yet" outcome.
#[allow(clippy::too_many_arguments)]
pub fn check_stake_kernel_hash(
    chain: &ChainState,
    params: &ChainParams,
    bits: u32,
    prev: &BlockIndex,
    block_from: &BlockHeader,
    tx_prev_offset: u32,
    tx_prev: &Transaction,
    prevout: &OutPoint,
    time_tx: u32,
    adjusted_time: i64,
) -> Result<Option<[u8; 32]>, ConsensusError> {
    let time_block_from = block_from.timestamp;
    if time_tx < time_block_from {
        return Err(KernelError::TimeViolation {
            time_tx,
            time_block_from,
        }
        .into());
    }
    if time_block_from as i64 + params.stake_min_age > time_tx as i64 {
        return Err(KernelError::MinAgeViolation {
            time_tx,
            time_block_from,
        }
        .into());
    }

    let target_per_coin_day = target_from_compact(bits);
    let value_in = match tx_prev.vout.get(prevout.n as usize) {
        Some(out) => out.value,
        None => return Err(KernelError::MinValueViolation { value: 0 }.into()),
    };
    if value_in < params.minimum_stake_value {
        return Err(KernelError::MinValueViolation { value: value_in }.into());
    }

    // Weight starts accruing only past the minimum age and saturates at the
    // maximum, so old coins stop gaining advantage.
    let time_weight = stake_time_weight(params, time_tx, time_block_from);
    let coin_day_weight = U256::from(value_in as u64) * U256::from(time_weight as u64)
        / U256::from(params.coin_unit as u64)
        / U256::from(200u64);

    let (stake_modifier, stake_modifier_height, stake_modifier_time) =
        match get_kernel_stake_modifier(
            chain,
            params,
            prev,
            &block_from.block_hash(),
            adjusted_time,
        )? {
            Some(resolved) => resolved,
            None => return Ok(None),
        };

    // Kernel preimage, little-endian throughout. The tx-prev time on this
    // chain is the time of its confirming block.
    let mut data = Vec::with_capacity(28);
    data.write_u64::<LittleEndian>(stake_modifier)
        .expect("vec write");
    data.write_u32::<LittleEndian>(time_block_from)
        .expect("vec write");
    data.write_u32::<LittleEndian>(tx_prev_offset)
        .expect("vec write");
    data.write_u32::<LittleEndian>(time_block_from)
        .expect("vec write");
    data.write_u32::<LittleEndian>(prevout.n).expect("vec write");
    data.write_u32::<LittleEndian>(time_tx).expect("vec write");
    let hash_proof_of_stake = sha256d(&data);

    log::debug!(
        "check_stake_kernel_hash: modifier=0x{:016x} at height={} time={} hashProof={}",
        stake_modifier,
        stake_modifier_height,
        stake_modifier_time,
        hex::encode(hash_proof_of_stake)
    );

    if !proof_meets_target(&hash_proof_of_stake, coin_day_weight, target_per_coin_day) {
        return Err(KernelError::TargetExceeded {
            hash: hex::encode(hash_proof_of_stake),
        }
        .into());
    }
    Ok(Some(hash_proof_of_stake))
}

/// The staker's payout must go to the same key the staked input paid.
/// Non-standard scripts on both sides extract the zero key-id and compare
/// EQUAL here; kept for consensus compatibility with deployed nodes.
pub fn check_kernel_script(script_vin: &[u8], script_vout: &[u8]) -> bool {
    extract_key_id(script_vin) == extract_key_id(script_vout)
}

/// Full proof-of-stake check for a block: load the staked coin's parent
/// transaction through the tx index, verify the payout script, then the
/// kernel hash. Returns the proof hash to be recorded on the index entry.
pub fn check_proof_of_stake(
    ctx: &ConsensusContext,
    chain: &ChainState,
    block: &Block,
    prev: &BlockIndex,
) -> Result<[u8; 32], ConsensusError> {
    let tx = match block.transactions.get(1) {
        Some(tx) if tx.is_coinstake() => tx,
        _ => {
            return Err(KernelError::NotCoinStake {
                txid: hex::encode(block.block_hash()),
            }
            .into())
        }
    };
    let txin = &tx.vin[0];

    let postx = ctx
        .store
        .read_tx_index(&txin.prevout.hash)
        .map_err(IoError::Store)?
        .ok_or_else(|| IoError::TxIndexMissing(hex::encode(txin.prevout.hash)))?;

    // Read the parent tx and the header of its block from the block file.
    let raw = ctx.store.open_block_file(&postx).map_err(IoError::Store)?;
    let mut file = Cursor::new(raw);
    let header = BlockHeader::consensus_decode(&mut file).map_err(IoError::DeserializeFailed)?;
    file.set_position(postx.tx_offset as u64);
    let tx_prev = Transaction::consensus_decode(&mut file).map_err(IoError::DeserializeFailed)?;
    if tx_prev.txid() != txin.prevout.hash {
        return Err(IoError::TxidMismatch {
            read: hex::encode(tx_prev.txid()),
            expected: hex::encode(txin.prevout.hash),
        }
        .into());
    }

    let prev_out = tx_prev
        .vout
        .get(txin.prevout.n as usize)
        .ok_or_else(|| {
            IoError::DeserializeFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "stake prevout index out of range",
            ))
        })?;

    if !check_kernel_script(&prev_out.script_pubkey, &tx.vout[1].script_pubkey) {
        return Err(KernelError::ScriptMismatch {
            txid: hex::encode(tx.txid()),
        }
        .into());
    }

    match check_stake_kernel_hash(
        chain,
        &ctx.params,
        block.header.bits,
        prev,
        &header,
        postx.tx_offset,
        &tx_prev,
        &txin.prevout,
        block.header.timestamp,
        ctx.time.adjusted_time(),
    )? {
        Some(hash_proof_of_stake) => Ok(hash_proof_of_stake),
        None => Err(ModifierError::NotReadyYet(hex::encode(header.block_hash())).into()),
    }
}

/// Per-block checksum over the consensus-critical stake fields, chained
/// through the parent's checksum.
pub fn stake_modifier_checksum(
    chain: &ChainState,
    params: &ChainParams,
    entry: &BlockIndex,
) -> Result<u32, ChainIndexError> {
    if entry.prev.is_none() && entry.hash != params.genesis_hash {
        return Err(ChainIndexError::NullPrev);
    }
    let mut data = Vec::with_capacity(48);
    if let Some(parent) = chain.parent(entry) {
        data.write_u32::<LittleEndian>(parent.stake_modifier_checksum)
            .expect("vec write");
    }
    data.write_u32::<LittleEndian>(entry.flags).expect("vec write");
    data.extend_from_slice(&entry.hash_proof_of_stake);
    data.write_u64::<LittleEndian>(entry.stake_modifier)
        .expect("vec write");
    let hash_checksum = u256_from_hash(&sha256d(&data)) >> 224u32;
    Ok(hash_checksum.low_u64() as u32)
}

/// Compare a computed checksum against the hard checkpoint table; heights
/// outside the table always pass.
pub fn check_stake_modifier_checkpoints(height: u32, checksum: u32) -> bool {
    match STAKE_MODIFIER_CHECKPOINTS
        .iter()
        .find(|(h, _)| *h == height)
    {
        Some(&(_, expected)) => checksum == expected,
        None => true,
    }
}
