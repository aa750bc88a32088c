use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Process-scoped mining observability, read by RPC and the UI. Writers
/// are the assembler and staker threads; readers get best-effort values.
#[derive(Debug, Default)]
pub struct MinerStats {
    last_block_tx: AtomicU64,
    last_block_size: AtomicU64,
    last_block_weight: AtomicU64,
    last_coin_stake_search_interval: AtomicU64,
    staking: AtomicBool,
}

impl MinerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_template(&self, txs: u64, size: u64, weight: u64) {
        self.last_block_tx.store(txs, Ordering::Relaxed);
        self.last_block_size.store(size, Ordering::Relaxed);
        self.last_block_weight.store(weight, Ordering::Relaxed);
    }

    pub fn last_block_tx(&self) -> u64 {
        self.last_block_tx.load(Ordering::Relaxed)
    }

    pub fn last_block_size(&self) -> u64 {
        self.last_block_size.load(Ordering::Relaxed)
    }

    pub fn last_block_weight(&self) -> u64 {
        self.last_block_weight.load(Ordering::Relaxed)
    }

    pub fn set_coin_stake_search_interval(&self, interval: u64) {
        self.last_coin_stake_search_interval
            .store(interval, Ordering::Relaxed);
    }

    pub fn coin_stake_search_interval(&self) -> u64 {
        self.last_coin_stake_search_interval.load(Ordering::Relaxed)
    }

    pub fn set_staking(&self, enabled: bool) {
        self.staking.store(enabled, Ordering::Relaxed);
    }

    pub fn is_staking(&self) -> bool {
        self.staking.load(Ordering::Relaxed)
    }
}
