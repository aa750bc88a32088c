use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{
    Amount, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use tokio::sync::{mpsc, watch, RwLock};

use ember_core::time::TimeSource;
use ember_core::{ChainParams, ChainState, ChainTip, TimedBlock};
use ember_mempool::Mempool;
use ember_miner::{
    AssemblerConfig, BlockAssembler, BlockAcceptor, CoinStake, ConstantDifficulty, MinerStats,
    NetworkStatus, Staker, StakeVerifier, StakeWallet,
};

const NOW: u32 = 2_000_000_000;

struct TickingTime(AtomicU32);

impl TimeSource for TickingTime {
    fn adjusted_time(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

struct TestWallet {
    has_script: bool,
}

#[async_trait]
impl StakeWallet for TestWallet {
    fn is_locked(&self) -> bool {
        false
    }

    fn reserve_script(&self) -> Result<ScriptBuf> {
        if !self.has_script {
            bail!("keypool ran out");
        }
        Ok(ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::all_zeros()))
    }

    async fn create_coin_stake(
        &self,
        _bits: CompactTarget,
        _search_interval: u64,
        search_time: u32,
        reward: Amount,
    ) -> Result<Option<CoinStake>> {
        let tx = Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([5u8; 32]),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![
                TxOut {
                    value: Amount::ZERO,
                    script_pubkey: ScriptBuf::new(),
                },
                TxOut {
                    value: reward,
                    script_pubkey: ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::all_zeros()),
                },
            ],
        };
        Ok(Some(CoinStake {
            tx,
            time: search_time,
        }))
    }

    fn sign_block_hash(&self, _hash: &BlockHash) -> Result<Vec<u8>> {
        Ok(vec![0xab; 64])
    }
}

struct TestNetwork;

impl NetworkStatus for TestNetwork {
    fn peer_count(&self) -> usize {
        1
    }

    fn is_initial_block_download(&self) -> bool {
        false
    }
}

struct TestVerifier;

impl StakeVerifier for TestVerifier {
    fn check_proof_of_stake(
        &self,
        coinstake: &Transaction,
        _coinstake_time: u32,
        _bits: CompactTarget,
    ) -> Result<()> {
        if !ember_core::block::is_coin_stake(coinstake) {
            bail!("not a coinstake");
        }
        Ok(())
    }
}

struct TestAcceptor {
    accepted: AtomicUsize,
    notify: mpsc::UnboundedSender<BlockHash>,
}

#[async_trait]
impl BlockAcceptor for TestAcceptor {
    async fn process_new_block(&self, block: &TimedBlock) -> Result<bool> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        let _ = self.notify.send(block.block_hash());
        Ok(true)
    }
}

fn tip() -> ChainTip {
    ChainTip {
        height: 100,
        hash: BlockHash::from_byte_array([9u8; 32]),
        time: NOW - 100,
        median_time_past: NOW - 1_000,
    }
}

struct Harness {
    staker: Staker,
    shutdown: watch::Sender<bool>,
    stats: Arc<MinerStats>,
    acceptor: Arc<TestAcceptor>,
    blocks: mpsc::UnboundedReceiver<BlockHash>,
}

fn harness(has_script: bool) -> Harness {
    let params = ChainParams::regtest();
    let time_source: Arc<dyn TimeSource> = Arc::new(TickingTime(AtomicU32::new(NOW)));
    let stats = Arc::new(MinerStats::new());
    let assembler = BlockAssembler::new(
        params.clone(),
        AssemblerConfig::default(),
        time_source.clone(),
        Arc::new(ConstantDifficulty::regtest()),
        stats.clone(),
    );

    let (notify, blocks) = mpsc::unbounded_channel();
    let acceptor = Arc::new(TestAcceptor {
        accepted: AtomicUsize::new(0),
        notify,
    });
    let (shutdown, shutdown_rx) = watch::channel(false);

    let staker = Staker::new(
        params,
        Arc::new(RwLock::new(ChainState::new(tip()))),
        Arc::new(RwLock::new(Mempool::new())),
        Arc::new(TestWallet { has_script }),
        Arc::new(TestNetwork),
        Arc::new(TestVerifier),
        acceptor.clone(),
        assembler,
        time_source,
        stats.clone(),
        shutdown_rx,
        Duration::from_millis(10),
    );

    Harness {
        staker,
        shutdown,
        stats,
        acceptor,
        blocks,
    }
}

#[tokio::test]
async fn test_staking_round_produces_accepted_block() {
    let mut h = harness(true);
    h.stats.set_staking(true);

    let handle = tokio::spawn(h.staker.run());

    let hash = tokio::time::timeout(Duration::from_secs(10), h.blocks.recv())
        .await
        .expect("staker produced a block in time")
        .expect("channel open");
    assert_ne!(hash, BlockHash::from_byte_array([0u8; 32]));
    assert!(h.acceptor.accepted.load(Ordering::SeqCst) >= 1);

    h.shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("staker exited after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_staker_waits_for_staking_flag_and_honors_shutdown() {
    let h = harness(true);
    // Staking stays disabled; the loop parks on the poll.

    let handle = tokio::spawn(h.staker.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.acceptor.accepted.load(Ordering::SeqCst), 0);

    h.shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("staker exited after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_staker_fails_without_reserve_script() {
    let h = harness(false);
    h.stats.set_staking(true);

    let result = h.staker.run().await;
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("No coinbase script available"));
}
