use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bitcoin::{Amount, BlockHash, CompactTarget, ScriptBuf, Transaction};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info};

use ember_core::params::{past_drift, ChainParams, BLOCK_LIMITER_TIME, WITNESS_SCALE_FACTOR};
use ember_core::{block_merkle_root, get_legacy_sig_op_count, ChainState, ChainTip, TimeSource};
use ember_mempool::Mempool;

use crate::assembler::BlockAssembler;
use crate::stats::MinerStats;
use crate::submit::{check_stake, BlockAcceptor, StakeVerifier};
use crate::template::{BlockMode, BlockTemplate};

/// A coinstake the wallet's kernel search produced: the transaction plus
/// the timestamp the kernel was found at.
#[derive(Debug, Clone)]
pub struct CoinStake {
    pub tx: Transaction,
    pub time: u32,
}

/// Wallet surface the staker drives. The kernel search and key handling
/// live behind this trait.
#[async_trait]
pub trait StakeWallet: Send + Sync {
    fn is_locked(&self) -> bool;
    /// A script the wallet reserves for block rewards. Fails when the
    /// keypool is exhausted.
    fn reserve_script(&self) -> Result<ScriptBuf>;
    /// Search the kernel space covered by `search_interval` seconds ending
    /// at `search_time` for a stake meeting `bits`.
    async fn create_coin_stake(
        &self,
        bits: CompactTarget,
        search_interval: u64,
        search_time: u32,
        reward: Amount,
    ) -> Result<Option<CoinStake>>;
    fn sign_block_hash(&self, hash: &BlockHash) -> Result<Vec<u8>>;
}

/// Peer-facing state the staker polls before producing blocks.
pub trait NetworkStatus: Send + Sync {
    fn peer_count(&self) -> usize;
    fn is_initial_block_download(&self) -> bool;
}

/// Supervisory staking loop: waits out the network and wallet, then
/// repeatedly assembles a proof-of-stake template, asks the wallet to sign
/// it, and submits the result. Cancellation arrives over the watch channel
/// and is honored at every sleep point.
pub struct Staker {
    params: ChainParams,
    chain: Arc<RwLock<ChainState>>,
    mempool: Arc<RwLock<Mempool>>,
    wallet: Arc<dyn StakeWallet>,
    network: Arc<dyn NetworkStatus>,
    verifier: Arc<dyn StakeVerifier>,
    acceptor: Arc<dyn BlockAcceptor>,
    assembler: BlockAssembler,
    time_source: Arc<dyn TimeSource>,
    stats: Arc<MinerStats>,
    shutdown: watch::Receiver<bool>,
    miner_sleep: Duration,
    last_search_time: u32,
}

impl Staker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: ChainParams,
        chain: Arc<RwLock<ChainState>>,
        mempool: Arc<RwLock<Mempool>>,
        wallet: Arc<dyn StakeWallet>,
        network: Arc<dyn NetworkStatus>,
        verifier: Arc<dyn StakeVerifier>,
        acceptor: Arc<dyn BlockAcceptor>,
        assembler: BlockAssembler,
        time_source: Arc<dyn TimeSource>,
        stats: Arc<MinerStats>,
        shutdown: watch::Receiver<bool>,
        miner_sleep: Duration,
    ) -> Self {
        let last_search_time = time_source.adjusted_time();
        Self {
            params,
            chain,
            mempool,
            wallet,
            network,
            verifier,
            acceptor,
            assembler,
            time_source,
            stats,
            shutdown,
            miner_sleep,
            last_search_time,
        }
    }

    /// Run until cancelled or a terminal wallet failure.
    pub async fn run(mut self) -> Result<()> {
        info!("staker started");

        // Claim the reserve script up front so staking fails fast on an
        // empty keypool.
        self.wallet
            .reserve_script()
            .context("No coinbase script available (staking requires a wallet)")?;

        loop {
            if self.shutdown_requested() {
                break;
            }

            if self.params.mining_requires_peers() {
                // Busy-wait for the network to come online so we don't
                // stake on an obsolete chain. On regtest we fly solo.
                loop {
                    if self.network.peer_count() > 0 && !self.network.is_initial_block_download() {
                        break;
                    }
                    if !self.sleep(Duration::from_secs(1)).await {
                        return Ok(());
                    }
                }
            }

            while !self.stats.is_staking() {
                if !self.sleep(Duration::from_secs(1)).await {
                    return Ok(());
                }
            }

            while self.wallet.is_locked() {
                self.stats.set_coin_stake_search_interval(0);
                if !self.sleep(Duration::from_secs(1)).await {
                    return Ok(());
                }
            }

            let (mut template, tip) = {
                let chain = self.chain.read().await;
                let mempool = self.mempool.read().await;
                let template = match self.assembler.create_new_block(
                    &chain,
                    &mempool,
                    BlockMode::ProofOfStake,
                    true,
                ) {
                    Ok(template) => template,
                    Err(e) => {
                        error!("staker could not assemble a block template: {e:#}");
                        return Err(e);
                    }
                };
                (template, chain.tip())
            };

            let stake_reward = template
                .stake_reward
                .expect("proof-of-stake template carries a reward");

            if self.sign_block(&mut template, stake_reward, &tip).await? {
                debug!("PoS block signed");
                if let Err(e) = check_stake(
                    &self.chain,
                    self.verifier.as_ref(),
                    self.acceptor.as_ref(),
                    &template.block,
                )
                .await
                {
                    error!("CheckStake: {e:#}");
                }
                if !self.sleep(Duration::from_millis(500)).await {
                    return Ok(());
                }
            } else if !self.sleep(self.miner_sleep).await {
                return Ok(());
            }
        }

        info!("staker terminated");
        Ok(())
    }

    /// Try to turn a proof-of-stake template into a signed block. Returns
    /// false when no kernel was found this round.
    async fn sign_block(
        &mut self,
        template: &mut BlockTemplate,
        stake_reward: Amount,
        tip: &ChainTip,
    ) -> Result<bool> {
        {
            let coinbase_out = &template.block.txdata[0].output[0];
            // Only proof-of-stake templates have the empty coinbase slot.
            if coinbase_out.value.to_sat() != 0 || !coinbase_out.script_pubkey.is_empty() {
                return Ok(false);
            }
        }
        if template.block.is_proof_of_stake() {
            // Already carries a coinstake.
            return Ok(true);
        }

        let search_time = self.time_source.adjusted_time();
        if search_time > self.last_search_time {
            let search_interval = (search_time - self.last_search_time) as u64;
            let found = self
                .wallet
                .create_coin_stake(
                    template.block.header.bits,
                    search_interval,
                    search_time,
                    stake_reward,
                )
                .await?;

            if let Some(coinstake) = found {
                let min_time =
                    (tip.median_time_past + BLOCK_LIMITER_TIME + 1).max(past_drift(tip.time));
                if coinstake.time >= min_time {
                    let block = &mut template.block;

                    // The coinstake timestamp doubles as the block
                    // timestamp, then the header moves up to the stake
                    // timestamp protocol.
                    block.tx_times[0] = coinstake.time;
                    block.header.time = (tip.median_time_past + BLOCK_LIMITER_TIME + 1)
                        .max(block.max_transaction_time())
                        .max(past_drift(tip.time));

                    // No transaction in the block may postdate the block
                    // itself.
                    let block_time = block.header.time;
                    let mut index = 0;
                    while index < block.txdata.len() {
                        if index > 0 && block.tx_times[index] > block_time {
                            block.txdata.remove(index);
                            block.tx_times.remove(index);
                            template.tx_fees.remove(index);
                            template.tx_sigops.remove(index);
                        } else {
                            index += 1;
                        }
                    }

                    let coinstake_sigops =
                        WITNESS_SCALE_FACTOR as i64 * get_legacy_sig_op_count(&coinstake.tx);
                    block.txdata.insert(1, coinstake.tx);
                    block.tx_times.insert(1, coinstake.time);
                    template.tx_fees.insert(1, 0);
                    template.tx_sigops.insert(1, coinstake_sigops);

                    block.header.merkle_root = block_merkle_root(&block.txdata);

                    let signature = self.wallet.sign_block_hash(&block.block_hash())?;
                    block.signature = signature;
                    return Ok(true);
                }
            }

            self.stats
                .set_coin_stake_search_interval((search_time - self.last_search_time) as u64);
            self.last_search_time = search_time;
        }

        Ok(false)
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep, waking early on cancellation. Returns false when the staker
    /// should exit.
    async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.changed() => {
                info!("staker terminated");
                false
            }
        }
    }
}
