//! Block reward and payee validation: how much value a block may create and
//! which outputs it must contain (masternode, operator, superblock, and the
//! one-off generation payment).

use std::collections::BTreeMap;

use crate::blockchain::chain_state::ChainState;
use crate::context::ConsensusContext;
use crate::governance_manager::GovernanceManager;
use crate::masternode_manager::DeterministicMasternode;
use crate::primitives::{Block, Transaction, TxOut};
use crate::script::{extract_key_id, script_for_key_id};
use crate::spork_manager::SPORK_9_SUPERBLOCKS_ENABLED;

/// Sum of the previous-output values consumed by the coinstake, via the tx
/// index. `None` when an input cannot be resolved.
fn coinstake_value_in(ctx: &ConsensusContext, coinstake: &Transaction) -> Option<i64> {
    let mut value_in = 0i64;
    for input in &coinstake.vin {
        let prev_tx = match ctx.store.get_tx(&input.prevout.hash) {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                log::error!(
                    "coinstake_value_in: input tx {} not found",
                    hex::encode(input.prevout.hash)
                );
                return None;
            }
            Err(e) => {
                log::error!(
                    "coinstake_value_in: failed to load input tx {}: {}",
                    hex::encode(input.prevout.hash),
                    e
                );
                return None;
            }
        };
        match prev_tx.vout.get(input.prevout.n as usize) {
            Some(out) => value_in += out.value,
            None => {
                log::error!(
                    "coinstake_value_in: prevout {}:{} out of range",
                    hex::encode(input.prevout.hash),
                    input.prevout.n
                );
                return None;
            }
        }
    }
    Some(value_in)
}

/// Determine whether the block creates no more value than the schedule
/// allows. Superblocks may exceed the plain reward up to the governance
/// payment limit; the generation block is exempt (its payee is checked in
/// `is_block_payee_valid`).
pub fn is_block_value_valid(
    ctx: &ConsensusContext,
    block: &Block,
    block_height: u32,
    block_reward: i64,
) -> (bool, String) {
    let params = &ctx.params;
    let n = block.is_proof_of_stake() as usize;
    let mut value_in = 0i64;
    if block.is_proof_of_stake() {
        value_in = match coinstake_value_in(ctx, &block.transactions[1]) {
            Some(v) => v,
            None => {
                return (
                    false,
                    format!("unable to resolve coinstake inputs at height {}", block_height),
                )
            }
        };
    }

    let block_value = block.transactions[n].value_out() - value_in;
    let is_block_reward_value_met = block_value <= block_reward;
    log::debug!(
        "is_block_value_valid: blockValue {} <= blockReward {}",
        block_value,
        block_reward
    );

    let superblock_max_value =
        block_reward + GovernanceManager::get_payments_limit(params, block_height);
    let is_superblock_max_value_met = block_value <= superblock_max_value;
    log::debug!(
        "is_block_value_valid: blockValue {} <= superblockMaxValue {}",
        block_value,
        superblock_max_value
    );

    if block_height == params.generation_height {
        return (true, String::new());
    }

    if !GovernanceManager::is_valid_superblock_height(params, block_height) {
        // Can't possibly be a superblock, so just check the reward limit.
        if !is_block_reward_value_met {
            return (
                false,
                format!(
                    "coinbase pays too much at height {} (actual={} vs limit={}), exceeded block reward, only regular blocks are allowed at this height",
                    block_height, block_value, block_reward
                ),
            );
        }
        return (true, String::new());
    }

    // Bail out in case superblock limits were exceeded.
    if !is_superblock_max_value_met {
        return (
            false,
            format!(
                "coinbase pays too much at height {} (actual={} vs limit={}), exceeded superblock max value",
                block_height, block_value, superblock_max_value
            ),
        );
    }

    if !ctx.masternode_sync.is_synced() || ctx.lite_mode {
        // Not enough data for full checks, but the superblock cap held. We
        // rely on the network to have followed the correct chain here.
        log::warn!("is_block_value_valid: not enough data, checked superblock max bounds only");
        return (true, String::new());
    }

    if !ctx.spork_manager.is_spork_active(SPORK_9_SUPERBLOCKS_ENABLED) {
        log::debug!("is_block_value_valid: superblocks are disabled");
        if !is_block_reward_value_met {
            return (
                false,
                format!(
                    "coinbase pays too much at height {} (actual={} vs limit={}), exceeded block reward, superblocks are disabled",
                    block_height, block_value, block_reward
                ),
            );
        }
        return (true, String::new());
    }

    if !ctx
        .governance_manager
        .is_superblock_triggered(params, block_height)
    {
        // Valid superblock height but no trigger: plain reward limits apply.
        if !is_block_reward_value_met {
            return (
                false,
                format!(
                    "coinbase pays too much at height {} (actual={} vs limit={}), exceeded block reward, no triggered superblock detected",
                    block_height, block_value, block_reward
                ),
            );
        }
        return (true, String::new());
    }

    // This also checks the payees, not only the amount.
    if !ctx
        .governance_manager
        .is_valid(params, &block.transactions[n], block_height, block_reward)
    {
        log::error!(
            "is_block_value_valid: invalid superblock detected at height {}",
            block_height
        );
        return (
            false,
            format!("invalid superblock detected at height {}", block_height),
        );
    }

    (true, String::new())
}

/// Expected masternode outputs for a block: the winning payee's payout, with
/// the operator's cut split off when one is registered.
pub fn get_block_tx_outs(
    ctx: &ConsensusContext,
    chain: &ChainState,
    block_height: u32,
    block_reward: i64,
) -> Option<Vec<TxOut>> {
    let mut masternode_reward = ctx.params.masternode_payment(block_height, block_reward);

    let selection_hash = match chain.at_height(block_height.checked_sub(1)?) {
        Some(entry) => entry.hash,
        None => {
            log::error!(
                "get_block_tx_outs: no active-chain block at height {}",
                block_height - 1
            );
            return None;
        }
    };
    let payee = ctx
        .masternode_manager
        .list_for_block(&selection_hash)
        .mn_payee()?;

    let mut operator_reward = 0i64;
    if payee.operator_reward != 0 && !payee.operator_payout_script.is_empty() {
        // This can come out to 0 once block rewards drop very low even
        // though an operator percentage is set.
        operator_reward = masternode_reward * payee.operator_reward as i64 / 10_000;
        masternode_reward -= operator_reward;
    }

    let mut vout_masternode_payments = Vec::with_capacity(2);
    if masternode_reward > 0 {
        vout_masternode_payments.push(TxOut::new(masternode_reward, payee.payout_script.clone()));
    }
    if operator_reward > 0 {
        vout_masternode_payments.push(TxOut::new(
            operator_reward,
            payee.operator_payout_script.clone(),
        ));
    }
    Some(vout_masternode_payments)
}

/// Block-producer wrapper over `get_block_tx_outs` that logs each payout.
pub fn get_masternode_tx_outs(
    ctx: &ConsensusContext,
    chain: &ChainState,
    block_height: u32,
    block_reward: i64,
) -> Option<Vec<TxOut>> {
    let vout_masternode_payments = match get_block_tx_outs(ctx, chain, block_height, block_reward) {
        Some(outs) => outs,
        None => {
            log::warn!("get_masternode_tx_outs: no payee (deterministic masternode list empty)");
            return None;
        }
    };
    for txout in &vout_masternode_payments {
        log::info!(
            "get_masternode_tx_outs: masternode payment {} to {}",
            txout.value,
            hex::encode(extract_key_id(&txout.script_pubkey))
        );
    }
    Some(vout_masternode_payments)
}

/// Every expected masternode output must appear verbatim in the transaction.
/// An empty masternode list skips enforcement (bootstrap window).
pub fn is_transaction_valid(
    ctx: &ConsensusContext,
    chain: &ChainState,
    tx_new: &Transaction,
    block_height: u32,
    block_reward: i64,
) -> bool {
    let vout_masternode_payments = match get_block_tx_outs(ctx, chain, block_height, block_reward) {
        Some(outs) => outs,
        None => {
            log::warn!(
                "is_transaction_valid: failed to get payees for block at height {}",
                block_height
            );
            return true;
        }
    };
    for txout in &vout_masternode_payments {
        if !tx_new.vout.iter().any(|out| out == txout) {
            log::error!(
                "is_transaction_valid: failed to find expected payee {} in block at height {}",
                hex::encode(extract_key_id(&txout.script_pubkey)),
                block_height
            );
            return false;
        }
    }
    true
}

/// Is this masternode due for payment within the next 8 projected payees?
/// Historical blocks cannot be verified outside full deterministic mode.
pub fn is_scheduled(
    ctx: &ConsensusContext,
    masternode: &DeterministicMasternode,
    _n_not_block_height: u32,
) -> bool {
    if !ctx.full_deterministic_mn_mode {
        return true;
    }
    ctx.masternode_manager
        .list_at_tip()
        .projected_mn_payees(8)
        .iter()
        .any(|mn| mn.pro_tx_hash == masternode.pro_tx_hash)
}

/// Validate the outputs of the block subsidy transaction at a height.
pub fn is_block_payee_valid(
    ctx: &ConsensusContext,
    chain: &ChainState,
    tx_new: &Transaction,
    block_height: u32,
    block_reward: i64,
) -> bool {
    let params = &ctx.params;

    // The generation amount may only ever go to the first spork address.
    if block_height == params.generation_height {
        let payee_script = script_for_key_id(&params.spork_addresses[0]);
        for out in &tx_new.vout {
            if out.value == params.generation_amount && out.script_pubkey == payee_script {
                log::info!("found correct generation recipient at height {}", block_height);
                return true;
            }
        }
        log::error!(
            "didn't find correct generation recipient at height {}",
            block_height
        );
        return false;
    }

    if ctx.lite_mode {
        // No budget data to check anything against; accept the longest chain.
        log::debug!("is_block_payee_valid: not enough data, skipping block payee checks");
        return true;
    }

    if block_height < params.superblock_start_block {
        // Pre-superblock history has tons of confirmations; accept any payee.
        log::debug!("is_block_payee_valid: old budget window, accepting any payee");
        return true;
    }

    if ctx.spork_manager.is_spork_active(SPORK_9_SUPERBLOCKS_ENABLED) {
        if ctx
            .governance_manager
            .is_superblock_triggered(params, block_height)
        {
            if ctx
                .governance_manager
                .is_valid(params, tx_new, block_height, block_reward)
            {
                log::debug!("is_block_payee_valid: valid superblock at height {}", block_height);
                // Continue validation; the masternode must be paid too.
            } else {
                log::error!(
                    "is_block_payee_valid: invalid superblock detected at height {}",
                    block_height
                );
                return false;
            }
        } else {
            log::debug!(
                "is_block_payee_valid: no triggered superblock detected at height {}",
                block_height
            );
        }
    } else {
        log::debug!("is_block_payee_valid: superblocks are disabled");
    }

    if is_transaction_valid(ctx, chain, tx_new, block_height, block_reward) {
        log::debug!(
            "is_block_payee_valid: valid masternode payment at height {}",
            block_height
        );
        return true;
    }

    log::error!(
        "is_block_payee_valid: invalid masternode payment detected at height {}",
        block_height
    );
    false
}

/// Inject the required payments into a block subsidy transaction under
/// construction. Output order is consensus-observable: the generation output
/// first (at its height), then masternode outputs, then superblock outputs.
/// Masternode payouts are subtracted from the miner/staker output.
pub fn fill_block_payments(
    ctx: &ConsensusContext,
    chain: &ChainState,
    tx_new: &mut Transaction,
    block_height: u32,
    block_reward: i64,
) -> (Vec<TxOut>, Vec<TxOut>) {
    let params = &ctx.params;

    // Only create superblock payments when the spork is on AND a superblock
    // was actually triggered at this height.
    let mut vout_superblock_payments = Vec::new();
    if ctx.spork_manager.is_spork_active(SPORK_9_SUPERBLOCKS_ENABLED)
        && ctx
            .governance_manager
            .is_superblock_triggered(params, block_height)
    {
        log::debug!(
            "fill_block_payments: triggered superblock creation at height {}",
            block_height
        );
        vout_superblock_payments = ctx.governance_manager.get_superblock_payments(block_height);
    }

    let vout_masternode_payments =
        get_masternode_tx_outs(ctx, chain, block_height, block_reward).unwrap_or_default();

    if block_height == params.generation_height {
        tx_new.vout.push(TxOut::new(
            params.generation_amount,
            script_for_key_id(&params.spork_addresses[0]),
        ));
    }

    tx_new.vout.extend(vout_masternode_payments.iter().cloned());
    tx_new.vout.extend(vout_superblock_payments.iter().cloned());

    // Done this way to be capable of pow/mn and pos/mn.
    let is_proof_of_stake = block_height > params.last_pow_block;
    for txout in &vout_masternode_payments {
        tx_new.vout[is_proof_of_stake as usize].value -= txout.value;
    }

    log::debug!(
        "fill_block_payments: height {} reward {} masternode outs {} superblock outs {}",
        block_height,
        block_reward,
        vout_masternode_payments.len(),
        vout_superblock_payments.len()
    );
    (vout_masternode_payments, vout_superblock_payments)
}

/// Human-readable payee line for one height.
pub fn get_required_payments_string(
    ctx: &ConsensusContext,
    block_height: u32,
    payee: Option<&DeterministicMasternode>,
) -> String {
    let mut line = match payee {
        Some(mn) => hex::encode(extract_key_id(&mn.payout_script)),
        None => "Unknown".to_string(),
    };
    if ctx
        .governance_manager
        .is_superblock_triggered(&ctx.params, block_height)
    {
        line.push_str(", ");
        line.push_str(&ctx.governance_manager.get_required_payments_string(block_height));
    }
    line
}

/// Payee lines for a height range. Past the tip, payees are projected from
/// the tip list.
pub fn get_required_payments_strings(
    ctx: &ConsensusContext,
    chain: &ChainState,
    start_height: u32,
    end_height: u32,
) -> BTreeMap<u32, String> {
    let mut payments = BTreeMap::new();
    let start_height = start_height.max(1);
    let chain_tip_height = match chain.height() {
        Some(h) => h,
        None => return payments,
    };

    let mut do_projection = false;
    for h in start_height..end_height {
        if h <= chain_tip_height {
            let payee = chain
                .at_height(h - 1)
                .map(|entry| ctx.masternode_manager.list_for_block(&entry.hash))
                .and_then(|list| list.mn_payee());
            payments.insert(h, get_required_payments_string(ctx, h, payee.as_deref()));
        } else {
            do_projection = true;
            break;
        }
    }
    if do_projection {
        let projection = ctx
            .masternode_manager
            .list_at_tip()
            .projected_mn_payees((end_height - chain_tip_height) as usize);
        for (i, payee) in projection.iter().enumerate() {
            let h = chain_tip_height + 1 + i as u32;
            payments.insert(h, get_required_payments_string(ctx, h, Some(payee)));
        }
    }
    payments
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chainparams::{ChainParams, COIN};
    use crate::context::{ConsensusContext, FixedClock};
    use crate::governance_manager::SuperblockPayment;
    use crate::masternode_manager::MasternodeList;
    use crate::primitives::{BlockHeader, OutPoint, TxIn};
    use crate::spork_manager::SPORK_9_SUPERBLOCKS_ENABLED;
    use crate::storage::SqliteBlockStore;

    const BASE_TIME: u32 = 1_599_999_960;

    fn header(prev_block_hash: [u8; 32], timestamp: u32, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 5,
            prev_block_hash,
            merkle_root: [0u8; 32],
            timestamp,
            bits: 0x1e0ffff0,
            nonce,
        }
    }

    fn build_chain(len: u32) -> ChainState {
        let mut chain = ChainState::new();
        let genesis = header([0u8; 32], BASE_TIME, 0);
        let mut prev_hash = genesis.block_hash();
        chain.add_block_index(genesis).unwrap();
        for i in 1..=len {
            let h = header(prev_hash, BASE_TIME + i * 60, i);
            prev_hash = h.block_hash();
            chain.add_block_index(h).unwrap();
        }
        assert!(chain.set_best_chain(&prev_hash));
        chain
    }

    /// Synced context over a 1_300-block chain, with a short superblock
    /// cycle so superblock heights fit inside the fixture.
    fn fixture() -> (ConsensusContext, ChainState) {
        let mut params = ChainParams::mainnet();
        params.superblock_cycle = 1_200;
        let chain = build_chain(1_300);
        let store = SqliteBlockStore::open_in_memory().unwrap();
        let mut ctx = ConsensusContext::new(params, Arc::new(store));
        ctx.time = Arc::new(FixedClock(1_700_000_000));
        ctx.masternode_sync.set_synced(true);
        (ctx, chain)
    }

    fn payee_script() -> Vec<u8> {
        script_for_key_id(&[0x21; 20])
    }

    fn operator_script() -> Vec<u8> {
        script_for_key_id(&[0x22; 20])
    }

    fn register_payee(
        ctx: &ConsensusContext,
        chain: &ChainState,
        block_height: u32,
        operator_reward: u16,
        with_operator_script: bool,
    ) -> Arc<DeterministicMasternode> {
        let selection_hash = chain.at_height(block_height - 1).unwrap().hash;
        let mn = Arc::new(DeterministicMasternode {
            pro_tx_hash: [0x11; 32],
            collateral_outpoint: OutPoint::new([0x11; 32], 0),
            operator_reward,
            payout_script: payee_script(),
            operator_payout_script: if with_operator_script {
                operator_script()
            } else {
                Vec::new()
            },
            last_paid_height: 0,
        });
        ctx.masternode_manager
            .update_list(MasternodeList::new(selection_hash, vec![Arc::clone(&mn)]));
        mn
    }

    fn coinbase(vout: Vec<TxOut>) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new([0; 32], u32::MAX),
                script_sig: vec![0x04, 0x01],
                sequence: u32::MAX,
            }],
            vout,
            lock_time: 0,
        }
    }

    fn pow_block(total_out: i64) -> Block {
        Block {
            header: header([0x77; 32], BASE_TIME + 500, 1),
            transactions: vec![coinbase(vec![TxOut::new(total_out, payee_script())])],
            block_sig: None,
        }
    }

    #[test]
    fn operator_split_orders_masternode_first() {
        let (ctx, chain) = fixture();
        register_payee(&ctx, &chain, 1_001, 2_500, true);
        // Half of the block reward goes to the masternode layer.
        let outs = get_block_tx_outs(&ctx, &chain, 1_001, 2_000_000_000).unwrap();
        assert_eq!(
            outs,
            vec![
                TxOut::new(750_000_000, payee_script()),
                TxOut::new(250_000_000, operator_script()),
            ]
        );
    }

    #[test]
    fn operator_share_needs_registered_script() {
        let (ctx, chain) = fixture();
        // Basis points set but no operator payout script: no split.
        register_payee(&ctx, &chain, 1_001, 2_500, false);
        let outs = get_block_tx_outs(&ctx, &chain, 1_001, 2_000_000_000).unwrap();
        assert_eq!(outs, vec![TxOut::new(1_000_000_000, payee_script())]);
    }

    #[test]
    fn empty_list_skips_enforcement() {
        let (ctx, chain) = fixture();
        assert!(get_block_tx_outs(&ctx, &chain, 1_001, 1_000 * COIN).is_none());
        let tx = coinbase(vec![TxOut::new(1_000 * COIN, vec![0x99])]);
        assert!(is_transaction_valid(&ctx, &chain, &tx, 1_001, 1_000 * COIN));
    }

    #[test]
    fn transaction_valid_requires_exact_outputs() {
        let (ctx, chain) = fixture();
        register_payee(&ctx, &chain, 1_001, 0, false);
        let expected = get_block_tx_outs(&ctx, &chain, 1_001, 1_000 * COIN).unwrap();

        let mut good = coinbase(vec![TxOut::new(500 * COIN, vec![0x99])]);
        good.vout.extend(expected.iter().cloned());
        assert!(is_transaction_valid(&ctx, &chain, &good, 1_001, 1_000 * COIN));

        let mut wrong_value = good.clone();
        wrong_value.vout[1].value -= 1;
        assert!(!is_transaction_valid(
            &ctx,
            &chain,
            &wrong_value,
            1_001,
            1_000 * COIN
        ));

        let bare = coinbase(vec![TxOut::new(500 * COIN, vec![0x99])]);
        assert!(!is_transaction_valid(&ctx, &chain, &bare, 1_001, 1_000 * COIN));
    }

    /// Funding tx paying `value` that the store can resolve for value-in.
    fn fund_stake(ctx: &ConsensusContext, value: i64) -> Transaction {
        let funding = Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new([0x55; 32], 0),
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(value, payee_script())],
            lock_time: 0,
        };
        let funding_block = Block {
            header: header([0x66; 32], BASE_TIME + 60, 9_999),
            transactions: vec![coinbase(vec![TxOut::new(0, vec![])]), funding.clone()],
            block_sig: None,
        };
        ctx.store.save_block(&funding_block).unwrap();
        funding
    }

    fn coinstake_spending(funding: &Transaction, total_out: i64) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new(funding.txid(), 0),
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(0, vec![]), TxOut::new(total_out, payee_script())],
            lock_time: 0,
        }
    }

    fn pos_block(coinstake: Transaction) -> Block {
        Block {
            header: header([0x77; 32], BASE_TIME + 600, 2),
            transactions: vec![coinbase(vec![TxOut::new(0, vec![])]), coinstake],
            block_sig: Some(vec![0x30]),
        }
    }

    #[test]
    fn fill_then_validate_round_trip() {
        let (ctx, chain) = fixture();
        let height = 1_001;
        let reward = 1_000 * COIN;
        register_payee(&ctx, &chain, height, 2_500, true);

        let stake_value = 12_000 * COIN;
        let funding = fund_stake(&ctx, stake_value);
        let mut coinstake = coinstake_spending(&funding, stake_value + reward);

        let total_before: i64 = coinstake.value_out();
        let (masternode_outs, superblock_outs) =
            fill_block_payments(&ctx, &chain, &mut coinstake, height, reward);
        assert_eq!(masternode_outs.len(), 2);
        assert!(superblock_outs.is_empty());
        // Payouts were appended and carved out of the staker's output, so
        // total created value is unchanged.
        assert_eq!(coinstake.value_out(), total_before);
        assert_eq!(coinstake.vout[2..], masternode_outs[..]);

        assert!(is_block_payee_valid(&ctx, &chain, &coinstake, height, reward));

        let block = pos_block(coinstake);
        let (valid, err) = is_block_value_valid(&ctx, &block, height, reward);
        assert!(valid, "{}", err);
    }

    #[test]
    fn fill_places_generation_output_before_masternode_outputs() {
        let (ctx, chain) = fixture();
        let height = ctx.params.generation_height;
        let reward = 1_000 * COIN;
        register_payee(&ctx, &chain, height, 0, false);

        let mut tx = coinbase(vec![TxOut::new(0, vec![]), TxOut::new(reward, payee_script())]);
        let (masternode_outs, _) = fill_block_payments(&ctx, &chain, &mut tx, height, reward);
        assert_eq!(masternode_outs.len(), 1);
        // vout: [marker, staker, generation, masternode]
        assert_eq!(tx.vout[2].value, ctx.params.generation_amount);
        assert_eq!(
            tx.vout[2].script_pubkey,
            script_for_key_id(&ctx.params.spork_addresses[0])
        );
        assert_eq!(tx.vout[3], masternode_outs[0]);
        assert!(is_block_payee_valid(&ctx, &chain, &tx, height, reward));
    }

    #[test]
    fn generation_height_requires_exact_recipient() {
        let (ctx, chain) = fixture();
        let height = ctx.params.generation_height;
        let good = coinbase(vec![TxOut::new(
            ctx.params.generation_amount,
            script_for_key_id(&ctx.params.spork_addresses[0]),
        )]);
        assert!(is_block_payee_valid(&ctx, &chain, &good, height, 1_000 * COIN));

        let wrong_amount = coinbase(vec![TxOut::new(
            ctx.params.generation_amount - 1,
            script_for_key_id(&ctx.params.spork_addresses[0]),
        )]);
        assert!(!is_block_payee_valid(
            &ctx,
            &chain,
            &wrong_amount,
            height,
            1_000 * COIN
        ));

        let wrong_script = coinbase(vec![TxOut::new(
            ctx.params.generation_amount,
            script_for_key_id(&[0x99; 20]),
        )]);
        assert!(!is_block_payee_valid(
            &ctx,
            &chain,
            &wrong_script,
            height,
            1_000 * COIN
        ));
    }

    #[test]
    fn generation_height_value_is_exempt() {
        let (ctx, _) = fixture();
        let block = pow_block(ctx.params.generation_amount + 1_000 * COIN);
        let (valid, _) = is_block_value_valid(&ctx, &block, ctx.params.generation_height, 1_000 * COIN);
        assert!(valid);
    }

    #[test]
    fn payees_below_superblock_start_pass_unchecked() {
        let (ctx, chain) = fixture();
        register_payee(&ctx, &chain, 500, 0, false);
        // The expected payee is missing, but pre-superblock history is
        // accepted on confirmations alone.
        let bare = coinbase(vec![TxOut::new(500 * COIN, vec![0x99])]);
        assert!(is_block_payee_valid(&ctx, &chain, &bare, 500, 1_000 * COIN));
    }

    #[test]
    fn regular_height_enforces_block_reward() {
        let (ctx, _) = fixture();
        let reward = 1_000 * COIN;
        let (valid, err) = is_block_value_valid(&ctx, &pow_block(reward), 300, reward);
        assert!(valid, "{}", err);
        let (valid, err) = is_block_value_valid(&ctx, &pow_block(reward + 1), 300, reward);
        assert!(!valid);
        assert!(err.contains("only regular blocks"));
    }

    #[test]
    fn pos_value_is_net_of_inputs() {
        let (ctx, _) = fixture();
        let reward = 1_000 * COIN;
        let stake_value = 12_000 * COIN;
        let funding = fund_stake(&ctx, stake_value);

        let block = pos_block(coinstake_spending(&funding, stake_value + reward));
        let (valid, err) = is_block_value_valid(&ctx, &block, 300, reward);
        assert!(valid, "{}", err);

        let greedy = pos_block(coinstake_spending(&funding, stake_value + reward + 1));
        let (valid, _) = is_block_value_valid(&ctx, &greedy, 300, reward);
        assert!(!valid);

        // Unresolvable stake input is an error, not a pass.
        let mut unknown = coinstake_spending(&funding, stake_value + reward);
        unknown.vin[0].prevout = OutPoint::new([0xee; 32], 0);
        let (valid, err) = is_block_value_valid(&ctx, &pos_block(unknown), 300, reward);
        assert!(!valid);
        assert!(err.contains("unable to resolve"));
    }

    #[test]
    fn superblock_cap_binds_even_unsynced() {
        let (ctx, _) = fixture();
        ctx.masternode_sync.set_synced(false);
        let reward = 1_000 * COIN;
        let height = 2_400; // first superblock height in the fixture cycle
        let limit = ctx.params.superblock_payment_limit;

        let (valid, _) = is_block_value_valid(&ctx, &pow_block(reward + limit), height, reward);
        assert!(valid, "under the cap is accepted while unsynced");
        let (valid, err) =
            is_block_value_valid(&ctx, &pow_block(reward + limit + 1), height, reward);
        assert!(!valid);
        assert!(err.contains("superblock max value"));
    }

    #[test]
    fn superblocks_disabled_reverts_to_reward_limit() {
        let (ctx, _) = fixture();
        let reward = 1_000 * COIN;
        let height = 2_400;
        // Spork 9 defaults to OFF.
        let (valid, err) = is_block_value_valid(&ctx, &pow_block(reward + 1), height, reward);
        assert!(!valid);
        assert!(err.contains("superblocks are disabled"));
        let (valid, _) = is_block_value_valid(&ctx, &pow_block(reward), height, reward);
        assert!(valid);
    }

    #[test]
    fn untriggered_superblock_reverts_to_reward_limit() {
        let (ctx, _) = fixture();
        ctx.spork_manager.set_spork(SPORK_9_SUPERBLOCKS_ENABLED, 0);
        let reward = 1_000 * COIN;
        let (valid, err) = is_block_value_valid(&ctx, &pow_block(reward + 1), 2_400, reward);
        assert!(!valid);
        assert!(err.contains("no triggered superblock"));
    }

    #[test]
    fn triggered_superblock_checks_plan() {
        let (ctx, chain) = fixture();
        ctx.spork_manager.set_spork(SPORK_9_SUPERBLOCKS_ENABLED, 0);
        let reward = 1_000 * COIN;
        let height = 2_400;
        let payment = SuperblockPayment {
            script_pubkey: script_for_key_id(&[0x44; 20]),
            amount: 500 * COIN,
        };
        ctx.governance_manager
            .add_superblock_trigger(height, vec![payment.clone()]);

        let mut good = pow_block(reward);
        good.transactions[0]
            .vout
            .push(TxOut::new(payment.amount, payment.script_pubkey.clone()));
        let (valid, err) = is_block_value_valid(&ctx, &good, height, reward);
        assert!(valid, "{}", err);
        assert!(is_block_payee_valid(
            &ctx,
            &chain,
            &good.transactions[0],
            height,
            reward
        ));

        let bad = pow_block(reward + payment.amount);
        let (valid, err) = is_block_value_valid(&ctx, &bad, height, reward);
        assert!(!valid);
        assert!(err.contains("invalid superblock"));
        assert!(!is_block_payee_valid(
            &ctx,
            &chain,
            &bad.transactions[0],
            height,
            reward
        ));
    }

    #[test]
    fn superblock_payments_fill_when_triggered() {
        let (ctx, chain) = fixture();
        ctx.spork_manager.set_spork(SPORK_9_SUPERBLOCKS_ENABLED, 0);
        let height = 2_400;
        let reward = 1_000 * COIN;
        let payment = SuperblockPayment {
            script_pubkey: script_for_key_id(&[0x44; 20]),
            amount: 500 * COIN,
        };
        ctx.governance_manager
            .add_superblock_trigger(height, vec![payment.clone()]);

        let mut tx = coinbase(vec![TxOut::new(0, vec![]), TxOut::new(reward, payee_script())]);
        let (masternode_outs, superblock_outs) =
            fill_block_payments(&ctx, &chain, &mut tx, height, reward);
        assert!(masternode_outs.is_empty());
        assert_eq!(
            superblock_outs,
            vec![TxOut::new(payment.amount, payment.script_pubkey)]
        );
        assert_eq!(tx.vout[2], superblock_outs[0]);
        // Superblock outputs are funded by governance, not carved out of the
        // staker output.
        assert_eq!(tx.vout[1].value, reward);
    }

    #[test]
    fn scheduling_is_permissive_outside_full_deterministic_mode() {
        let (ctx, chain) = fixture();
        let mn = register_payee(&ctx, &chain, 1_001, 0, false);
        assert!(is_scheduled(&ctx, &mn, 0));
    }

    #[test]
    fn scheduling_checks_first_eight_projected() {
        let (mut ctx, _) = fixture();
        ctx.full_deterministic_mn_mode = true;
        let mut mns = Vec::new();
        for i in 0..10u8 {
            mns.push(Arc::new(DeterministicMasternode {
                pro_tx_hash: [i; 32],
                collateral_outpoint: OutPoint::new([i; 32], 0),
                operator_reward: 0,
                payout_script: payee_script(),
                operator_payout_script: Vec::new(),
                last_paid_height: i as u32,
            }));
        }
        ctx.masternode_manager
            .set_tip_list(MasternodeList::new([0xaa; 32], mns.clone()));
        assert!(is_scheduled(&ctx, &mns[7], 0));
        assert!(!is_scheduled(&ctx, &mns[8], 0));
    }

    #[test]
    fn required_payments_cover_tip_and_projection() {
        let (ctx, chain) = fixture();
        let tip_height = chain.height().unwrap();
        let mn = register_payee(&ctx, &chain, tip_height, 0, false);
        ctx.masternode_manager
            .set_tip_list(MasternodeList::new([0xaa; 32], vec![Arc::clone(&mn)]));

        let payments =
            get_required_payments_strings(&ctx, &chain, tip_height - 1, tip_height + 3);
        // Direct entries for tip-1 and tip, then a one-entry projection.
        assert_eq!(
            payments.keys().copied().collect::<Vec<_>>(),
            vec![tip_height - 1, tip_height, tip_height + 1]
        );
        assert_eq!(payments[&(tip_height - 1)], "Unknown");
        let payee_hex = hex::encode(extract_key_id(&mn.payout_script));
        assert_eq!(payments[&tip_height], payee_hex);
        assert_eq!(payments[&(tip_height + 1)], payee_hex);
    }
}
