use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use bitcoin::block::Header as BlockHeader;
use bitcoin::hashes::Hash;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness};
use tracing::{debug, info};

use ember_core::params::{
    allow_free, ChainParams, BLOCK_LIMITER_TIME, MAX_BLOCK_SIGOPS_COST, WITNESS_SCALE_FACTOR,
};
use ember_core::{
    block_merkle_root, generate_coinbase_commitment, get_block_subsidy, get_legacy_sig_op_count,
    get_proof_of_stake_reward, is_final_tx, ChainState, ChainTip, FeeRate, TimeSource, TimedBlock,
};
use ember_mempool::{compare_ancestor_score, Mempool, MempoolEntry};

use crate::config::{AssemblerConfig, BlockLimits};
use crate::difficulty::DifficultyOracle;
use crate::modified::{ModifiedEntry, ModifiedTxSet};
use crate::stats::MinerStats;
use crate::template::{BlockMode, BlockTemplate};

/// Refresh a proof-of-work header's timestamp: never behind the median
/// time past bound, never behind network-adjusted now. Returns how far the
/// timestamp moved.
pub fn update_time(header: &mut BlockHeader, tip: &ChainTip, time_source: &dyn TimeSource) -> i64 {
    let old_time = header.time;
    let new_time = (tip.median_time_past + BLOCK_LIMITER_TIME + 1).max(time_source.adjusted_time());
    if old_time < new_time {
        header.time = new_time;
    }
    new_time as i64 - old_time as i64
}

/// Candidate in the priority lane's max-heap.
#[derive(Debug, Clone, Copy)]
struct PriorityCandidate {
    priority: f64,
    txid: Txid,
}

impl Ord for PriorityCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            // Equal priorities pop in txid order.
            .then_with(|| other.txid.cmp(&self.txid))
    }
}

impl PartialOrd for PriorityCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PriorityCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityCandidate {}

/// Assembles candidate blocks from the mempool. One instance may build
/// many templates; all selection state is reset per invocation, and each
/// invocation runs under the chain and mempool locks held by the caller.
pub struct BlockAssembler {
    params: ChainParams,
    config: AssemblerConfig,
    limits: BlockLimits,
    time_source: Arc<dyn TimeSource>,
    difficulty: Arc<dyn DifficultyOracle>,
    stats: Arc<MinerStats>,

    // Per-invocation selection state.
    in_block: HashSet<Txid>,
    block_weight: u64,
    block_size: u64,
    block_sigops: i64,
    fees: u64,
    block_tx: u64,
    height: u32,
    lock_time_cutoff: u32,
    include_witness: bool,
    need_size_accounting: bool,
    last_few_txs: u32,
    block_finished: bool,

    // Template under construction; index 0 is the coinbase placeholder
    // until finalization.
    txdata: Vec<Transaction>,
    tx_times: Vec<u32>,
    tx_fees: Vec<i64>,
    tx_sigops: Vec<i64>,
}

impl BlockAssembler {
    pub fn new(
        params: ChainParams,
        config: AssemblerConfig,
        time_source: Arc<dyn TimeSource>,
        difficulty: Arc<dyn DifficultyOracle>,
        stats: Arc<MinerStats>,
    ) -> Self {
        let limits = config.effective_limits();
        Self {
            params,
            config,
            limits,
            time_source,
            difficulty,
            stats,
            in_block: HashSet::new(),
            block_weight: 0,
            block_size: 0,
            block_sigops: 0,
            fees: 0,
            block_tx: 0,
            height: 0,
            lock_time_cutoff: 0,
            include_witness: false,
            need_size_accounting: false,
            last_few_txs: 0,
            block_finished: false,
            txdata: Vec::new(),
            tx_times: Vec::new(),
            tx_fees: Vec::new(),
            tx_sigops: Vec::new(),
        }
    }

    fn reset_block(&mut self) {
        self.in_block.clear();

        // Reserve space for the coinbase.
        self.block_size = 1000;
        self.block_weight = 4000;
        self.block_sigops = 400;
        self.include_witness = false;
        self.need_size_accounting = self.limits.need_size_accounting;

        // These counters do not include the coinbase.
        self.block_tx = 0;
        self.fees = 0;

        self.last_few_txs = 0;
        self.block_finished = false;

        self.txdata = vec![placeholder_coinbase()];
        self.tx_times = vec![0];
        self.tx_fees = vec![-1];
        self.tx_sigops = vec![-1];
    }

    /// Build a candidate block on the current tip. The caller holds the
    /// chain and mempool locks (chain first) for the whole call, so the
    /// pool's cached ancestor state stays coherent throughout selection.
    pub fn create_new_block(
        &mut self,
        chain: &ChainState,
        mempool: &Mempool,
        mode: BlockMode,
        mine_witness_txs: bool,
    ) -> Result<BlockTemplate> {
        self.reset_block();

        let tip = chain.tip();
        self.height = tip.height + 1;

        let mut version = chain.compute_block_version();
        if self.params.mine_blocks_on_demand() {
            if let Some(forced) = self.config.block_version {
                version = forced;
            }
        }

        let block_time = self.time_source.adjusted_time();
        self.lock_time_cutoff = if self.params.locktime_median_time_past {
            tip.median_time_past
        } else {
            block_time
        };

        self.include_witness = chain.is_witness_enabled(&self.params) && mine_witness_txs;

        self.add_priority_txs(mempool, mode.is_proof_of_stake(), block_time);
        self.add_package_txs(mempool);

        self.stats
            .record_template(self.block_tx, self.block_size, self.block_weight);

        // Coinbase.
        let total_fees = Amount::from_sat(self.fees);
        let mut coinbase = placeholder_coinbase();
        coinbase.input.push(TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::builder()
                .push_int(self.height as i64)
                .push_opcode(bitcoin::opcodes::OP_FALSE)
                .into_script(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });

        let stake_reward = match &mode {
            BlockMode::ProofOfStake => {
                // The signer replaces this with the real stake output.
                coinbase.output.push(TxOut {
                    value: Amount::ZERO,
                    script_pubkey: ScriptBuf::new(),
                });
                Some(total_fees + get_proof_of_stake_reward(self.height, &self.params))
            }
            BlockMode::ProofOfWork { script_pubkey } => {
                coinbase.output.push(TxOut {
                    value: total_fees + get_block_subsidy(self.height, &self.params),
                    script_pubkey: script_pubkey.clone(),
                });
                None
            }
        };

        self.txdata[0] = coinbase;
        self.tx_times[0] = self.time_source.adjusted_time();
        let coinbase_commitment =
            generate_coinbase_commitment(&mut self.txdata, self.include_witness);
        self.tx_fees[0] = -(self.fees as i64);
        self.tx_sigops[0] =
            WITNESS_SCALE_FACTOR as i64 * get_legacy_sig_op_count(&self.txdata[0]);

        // Header.
        let mut header = BlockHeader {
            version: bitcoin::block::Version::from_consensus(version),
            prev_blockhash: tip.hash,
            merkle_root: TxMerkleNode::from_byte_array([0u8; 32]),
            time: block_time,
            bits: self
                .difficulty
                .next_work_required(&tip, mode.is_proof_of_stake()),
            nonce: 0,
        };

        let txdata = std::mem::take(&mut self.txdata);
        let tx_times = std::mem::take(&mut self.tx_times);
        let tx_fees = std::mem::take(&mut self.tx_fees);
        let tx_sigops = std::mem::take(&mut self.tx_sigops);

        let mut block = TimedBlock {
            header,
            txdata,
            tx_times,
            signature: Vec::new(),
        };

        if mode.is_proof_of_stake() {
            // The stake timestamp protocol: past the limiter bound, never
            // behind the youngest transaction, within drift of the parent.
            block.header.time = (tip.median_time_past + BLOCK_LIMITER_TIME + 1)
                .max(block.max_transaction_time())
                .max(ember_core::params::past_drift(tip.time));
        } else {
            update_time(&mut block.header, &tip, self.time_source.as_ref());
        }
        block.header.merkle_root = block_merkle_root(&block.txdata);
        header = block.header;

        info!(
            "CreateNewBlock: height {} txs {} weight {} size {} sigops {} fees {}",
            self.height,
            self.block_tx,
            self.block_weight,
            self.block_size,
            self.block_sigops,
            total_fees.to_sat()
        );
        debug!(
            "CreateNewBlock: version {:#x} bits {:#x} time {}",
            header.version.to_consensus(),
            header.bits.to_consensus(),
            header.time
        );

        Ok(BlockTemplate {
            block,
            tx_fees,
            tx_sigops,
            coinbase_commitment,
            height: self.height,
            total_fees,
            stake_reward,
        })
    }

    /// True while some in-pool parent of `txid` is still outside the block.
    fn is_still_dependent(&self, mempool: &Mempool, txid: &Txid) -> bool {
        mempool
            .get_parents(txid)
            .iter()
            .any(|parent| !self.in_block.contains(parent))
    }

    fn only_unconfirmed(&self, set: &mut BTreeSet<Txid>) {
        set.retain(|txid| !self.in_block.contains(txid));
    }

    /// Package-level fit test against the remaining weight and sigop room.
    fn test_package(&self, package_weight: u64, package_sigops: i64) -> bool {
        if self.block_weight + package_weight >= self.limits.max_weight {
            return false;
        }
        if self.block_sigops + package_sigops >= MAX_BLOCK_SIGOPS_COST {
            return false;
        }
        true
    }

    /// Transaction-level checks on a gathered package: locktime finality,
    /// premature witness, and the byte ceiling when size accounting is on.
    fn test_package_transactions(&self, mempool: &Mempool, package: &BTreeSet<Txid>) -> bool {
        let mut potential_size = self.block_size;
        for txid in package {
            let entry = mempool.get(txid).expect("package entry in snapshot");
            if !is_final_tx(&entry.tx, self.height, self.lock_time_cutoff) {
                return false;
            }
            if !self.include_witness && entry.has_witness() {
                return false;
            }
            if self.need_size_accounting {
                if potential_size + entry.size >= self.limits.max_size {
                    return false;
                }
                potential_size += entry.size;
            }
        }
        true
    }

    /// Per-transaction fit test for the priority lane, with the tail-fill
    /// policy: a near-full block stops scanning instead of sifting the
    /// whole heap for a fit.
    fn test_for_block(&mut self, entry: &MempoolEntry) -> bool {
        if self.block_weight + entry.weight >= self.limits.max_weight {
            // No meaningful room left, or too many attempts to fill the
            // tail: flag the block finished.
            if self.block_weight > self.limits.max_weight - 400 || self.last_few_txs > 50 {
                self.block_finished = true;
                return false;
            }
            // Within 4000 weight of full, count down the remaining tries.
            if self.block_weight > self.limits.max_weight - 4000 {
                self.last_few_txs += 1;
            }
            return false;
        }

        if self.need_size_accounting
            && self.block_size + entry.size >= self.limits.max_size
        {
            if self.block_size > self.limits.max_size - 100 || self.last_few_txs > 50 {
                self.block_finished = true;
                return false;
            }
            if self.block_size > self.limits.max_size - 1000 {
                self.last_few_txs += 1;
            }
            return false;
        }

        if self.block_sigops + entry.sigop_cost >= MAX_BLOCK_SIGOPS_COST {
            if self.block_sigops > MAX_BLOCK_SIGOPS_COST - 8 {
                self.block_finished = true;
            }
            return false;
        }

        // Lock times must still be valid at the new height.
        is_final_tx(&entry.tx, self.height, self.lock_time_cutoff)
    }

    fn add_to_block(&mut self, mempool: &Mempool, entry: &MempoolEntry) {
        self.txdata.push(entry.tx.clone());
        self.tx_times.push(entry.tx_time);
        self.tx_fees.push(entry.fee.to_sat() as i64);
        self.tx_sigops.push(entry.sigop_cost);
        if self.need_size_accounting {
            self.block_size += entry.size;
        }
        self.block_weight += entry.weight;
        self.block_tx += 1;
        self.block_sigops += entry.sigop_cost;
        self.fees += entry.fee.to_sat();
        self.in_block.insert(entry.txid);

        if self.config.print_priority {
            let (priority_delta, _) = mempool.apply_deltas(&entry.txid);
            info!(
                "priority {:.1} fee {} txid {}",
                entry.priority(self.height) + priority_delta,
                FeeRate::from_fee_and_size(entry.mod_fee, entry.size),
                entry.txid
            );
        }
    }

    /// Push the just-added transactions' descendants into the modified
    /// index, subtracting exactly the added entries' own contributions from
    /// their cached package state.
    fn update_packages_for_added(
        &self,
        mempool: &Mempool,
        already_added: &BTreeSet<Txid>,
        modified: &mut ModifiedTxSet,
    ) {
        for txid in already_added {
            let added_entry = mempool.get(txid).expect("added entry in snapshot");
            for desc in mempool.calculate_descendants(txid) {
                if already_added.contains(&desc) || self.in_block.contains(&desc) {
                    continue;
                }
                if modified.contains(&desc) {
                    modified.adjust(&desc, |m| m.update_for_parent_inclusion(added_entry));
                } else {
                    let desc_entry = mempool.get(&desc).expect("descendant in snapshot");
                    let mut m = ModifiedEntry::from_entry(desc_entry);
                    m.update_for_parent_inclusion(added_entry);
                    modified.insert(m);
                }
            }
        }
    }

    /// Entries in the score-ordered walk are stale when already in the
    /// block, shadowed by a modified package, or known to fail; failures
    /// stay failed so nothing is re-evaluated with wrong cached numbers.
    fn skip_map_tx_entry(
        &self,
        txid: &Txid,
        modified: &ModifiedTxSet,
        failed: &HashSet<Txid>,
    ) -> bool {
        modified.contains(txid) || self.in_block.contains(txid) || failed.contains(txid)
    }

    /// Topological order for a package: ancestor count ascending is enough,
    /// since a descendant always counts strictly more ancestors than any
    /// of its ancestors.
    fn sort_for_block(&self, mempool: &Mempool, package: &BTreeSet<Txid>) -> Vec<Txid> {
        let mut sorted: Vec<Txid> = package.iter().copied().collect();
        sorted.sort_by_key(|txid| {
            let entry = mempool.get(txid).expect("package entry in snapshot");
            (entry.count_with_ancestors, *txid)
        });
        sorted
    }

    /// Ancestor-package selection: walk the mempool's ancestor-score order
    /// and the modified index side by side, always taking the better
    /// package, until the fee floor or the resource ceilings end the block.
    fn add_package_txs(&mut self, mempool: &Mempool) {
        let mut modified = ModifiedTxSet::new();
        let mut failed: HashSet<Txid> = HashSet::new();

        // Descendants of priority-lane inclusions start out modified.
        let seeded: BTreeSet<Txid> = self.in_block.iter().copied().collect();
        self.update_packages_for_added(mempool, &seeded, &mut modified);

        let order = mempool.ancestor_score_order();
        let mut mi = order.iter().peekable();

        loop {
            while let Some(candidate) = mi.peek() {
                if self.skip_map_tx_entry(candidate, &modified, &failed) {
                    mi.next();
                } else {
                    break;
                }
            }

            let map_candidate = mi.peek().map(|txid| **txid);
            let (txid, using_modified) = match (map_candidate, modified.best()) {
                (None, None) => break,
                // mapTx exhausted: drain the modified index.
                (None, Some(best)) => (best.txid, true),
                (Some(candidate), None) => (candidate, false),
                (Some(candidate), Some(best)) => {
                    let entry = mempool.get(&candidate).expect("entry in snapshot");
                    let best_wins = compare_ancestor_score(
                        best.mod_fees_with_ancestors,
                        best.size_with_ancestors,
                        &best.txid,
                        entry.mod_fees_with_ancestors,
                        entry.size_with_ancestors,
                        &candidate,
                    ) == Ordering::Greater;
                    if best_wins {
                        (best.txid, true)
                    } else {
                        (candidate, false)
                    }
                }
            };
            if !using_modified {
                mi.next();
            }

            assert!(!self.in_block.contains(&txid));

            let (package_size, package_weight, package_fees, package_sigops) = if using_modified {
                let m = modified.get(&txid).expect("modified entry present");
                (
                    m.size_with_ancestors,
                    m.weight_with_ancestors,
                    m.mod_fees_with_ancestors,
                    m.sigops_with_ancestors,
                )
            } else {
                let e = mempool.get(&txid).expect("entry in snapshot");
                (
                    e.size_with_ancestors,
                    e.weight_with_ancestors,
                    e.mod_fees_with_ancestors,
                    e.sigops_with_ancestors,
                )
            };

            if package_fees < self.config.min_relay_fee.fee_for(package_size) {
                // Everything else we might consider has a lower fee rate.
                return;
            }

            if !self.test_package(package_weight, package_sigops) {
                if using_modified {
                    // The best modified entry must leave the index, or the
                    // next iteration would pick it again.
                    modified.remove(&txid);
                    failed.insert(txid);
                }
                continue;
            }

            let mut package = mempool.calculate_ancestors(&txid);
            self.only_unconfirmed(&mut package);
            package.insert(txid);

            if !self.test_package_transactions(mempool, &package) {
                if using_modified {
                    modified.remove(&txid);
                    failed.insert(txid);
                }
                continue;
            }

            let sorted = self.sort_for_block(mempool, &package);
            for member in &sorted {
                let entry = mempool.get(member).expect("package entry in snapshot");
                self.add_to_block(mempool, entry);
                modified.remove(member);
            }

            self.update_packages_for_added(mempool, &package, &mut modified);
        }
    }

    /// Coin-age pre-pass: fill up to the configured byte budget with aged
    /// transactions regardless of the fees they pay.
    fn add_priority_txs(&mut self, mempool: &Mempool, proof_of_stake: bool, block_time: u32) {
        let priority_size = self.config.priority_size(&self.limits);
        if priority_size == 0 {
            return;
        }

        // Byte-budget enforcement is the lane's stop condition.
        let saved_size_accounting = self.need_size_accounting;
        self.need_size_accounting = true;

        let mut heap: BinaryHeap<PriorityCandidate> = mempool
            .iter()
            .map(|entry| {
                let (priority_delta, _) = mempool.apply_deltas(&entry.txid);
                PriorityCandidate {
                    priority: entry.priority(self.height) + priority_delta,
                    txid: entry.txid,
                }
            })
            .collect();
        let mut wait_map: HashMap<Txid, f64> = HashMap::new();

        while !self.block_finished {
            let Some(candidate) = heap.pop() else {
                break;
            };
            let adjusted_now = self.time_source.adjusted_time();

            assert!(!self.in_block.contains(&candidate.txid));
            let entry = mempool.get(&candidate.txid).expect("entry in snapshot");

            // Witness transactions cannot enter a non-witness block.
            if !self.include_witness && entry.has_witness() {
                continue;
            }

            if entry.tx_time > adjusted_now || (proof_of_stake && entry.tx_time > block_time) {
                continue;
            }

            // Parked until its last in-pool parent lands in the block.
            if self.is_still_dependent(mempool, &candidate.txid) {
                wait_map.insert(candidate.txid, candidate.priority);
                continue;
            }

            if self.test_for_block(entry) {
                self.add_to_block(mempool, entry);

                if self.block_size >= priority_size || !allow_free(candidate.priority) {
                    break;
                }

                for child in mempool.get_children(&candidate.txid) {
                    if let Some(parked_priority) = wait_map.remove(&child) {
                        heap.push(PriorityCandidate {
                            priority: parked_priority,
                            txid: child,
                        });
                    }
                }
            }
        }

        self.need_size_accounting = saved_size_accounting;
    }
}

fn placeholder_coinbase() -> Transaction {
    Transaction {
        version: bitcoin::transaction::Version::ONE,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: Vec::new(),
        output: Vec::new(),
    }
}
