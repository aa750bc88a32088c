use bitcoin::Amount;
use serde::{Deserialize, Serialize};

/// One coin in base units.
pub const COIN: u64 = 100_000_000;

/// Maximum allowed block weight (consensus).
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Maximum allowed serialized block size in bytes (consensus).
pub const MAX_BLOCK_SERIALIZED_SIZE: u64 = 4_000_000;

/// Maximum allowed signature-operation cost per block (consensus).
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;

/// Weight scale between base size and total size.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// A new block's timestamp must exceed the previous median-time-past by at
/// least this many seconds.
pub const BLOCK_LIMITER_TIME: u32 = 60;

/// How far behind the previous block's timestamp a proof-of-stake block
/// may reach, in seconds.
pub const PAST_DRIFT: u32 = 600;

/// Default weight ceiling for assembled blocks.
pub const DEFAULT_BLOCK_MAX_WEIGHT: u64 = 3_000_000;

/// Default serialized-size ceiling for assembled blocks.
pub const DEFAULT_BLOCK_MAX_SIZE: u64 = 750_000;

/// Default byte budget for the coin-age priority lane (0 disables it).
pub const DEFAULT_BLOCK_PRIORITY_SIZE: u64 = 0;

/// Marker bytes appended to the coinbase script sig when mining.
pub const COINBASE_FLAGS: &[u8] = b"/P2SH/";

/// Maximum length of the coinbase script sig.
pub const MAX_COINBASE_SCRIPT_SIG_SIZE: usize = 100;

/// Lower bound a proof-of-stake block timestamp may reach behind the
/// previous block's timestamp.
pub fn past_drift(prev_block_time: u32) -> u32 {
    prev_block_time.saturating_sub(PAST_DRIFT)
}

/// Coin-age priority above which a zero-fee transaction is still eligible
/// for the priority lane.
pub fn allow_free_threshold() -> f64 {
    COIN as f64 * 144.0 / 250.0
}

pub fn allow_free(priority: f64) -> bool {
    priority > allow_free_threshold()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

/// Consensus parameters the assembler needs from the active network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u32,
    /// Initial proof-of-work subsidy.
    pub initial_subsidy: Amount,
    /// Flat per-block proof-of-stake reward.
    pub proof_of_stake_reward: Amount,
    /// Height at which segwit rules activate.
    pub segwit_height: u32,
    /// Whether locktime finality is evaluated against median-time-past.
    pub locktime_median_time_past: bool,
}

impl ChainParams {
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            subsidy_halving_interval: 210_000,
            initial_subsidy: Amount::from_sat(50 * COIN),
            proof_of_stake_reward: Amount::from_sat(3 * COIN / 2),
            segwit_height: 0,
            locktime_median_time_past: true,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            ..Self::main()
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            subsidy_halving_interval: 150,
            ..Self::main()
        }
    }

    /// Regtest mines blocks on demand; block-version overrides are only
    /// honored there.
    pub fn mine_blocks_on_demand(&self) -> bool {
        self.network == Network::Regtest
    }

    /// Whether block production should wait for peers before starting.
    pub fn mining_requires_peers(&self) -> bool {
        self.network != Network::Regtest
    }

    pub fn is_witness_enabled(&self, height: u32) -> bool {
        height >= self.segwit_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_free_threshold() {
        // One coin aged 144 blocks at 250 bytes sits exactly on the
        // threshold; anything above clears it.
        let priority = COIN as f64 * 144.0 / 250.0 + 1.0;
        assert!(allow_free(priority));
        assert!(!allow_free(0.0));
    }

    #[test]
    fn test_past_drift_saturates() {
        assert_eq!(past_drift(1_000_000), 1_000_000 - PAST_DRIFT);
        assert_eq!(past_drift(100), 0);
    }

    #[test]
    fn test_network_flags() {
        assert!(ChainParams::main().mining_requires_peers());
        assert!(!ChainParams::regtest().mining_requires_peers());
        assert!(ChainParams::regtest().mine_blocks_on_demand());
        assert!(!ChainParams::main().mine_blocks_on_demand());
    }
}
