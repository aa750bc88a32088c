use anyhow::Result;
use serde::{Deserialize, Serialize};

use ember_core::params::{
    DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MAX_WEIGHT, DEFAULT_BLOCK_PRIORITY_SIZE,
    MAX_BLOCK_SERIALIZED_SIZE, MAX_BLOCK_WEIGHT, WITNESS_SCALE_FACTOR,
};
use ember_core::FeeRate;

/// Operator-facing knobs for block assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Weight ceiling. Setting it widens the size ceiling to the protocol
    /// maximum unless `block_max_size` is also set.
    pub block_max_weight: Option<u64>,
    /// Serialized-size ceiling. If the weight ceiling is unset, it is
    /// derived as size times the witness scale factor.
    pub block_max_size: Option<u64>,
    /// Byte budget for the coin-age priority lane; 0 disables the lane.
    pub block_priority_size: u64,
    /// Forced block version; honored on regtest only.
    pub block_version: Option<i32>,
    /// Log priority, fee rate and txid of each admitted transaction.
    pub print_priority: bool,
    /// Floor under which package selection stops.
    pub min_relay_fee: FeeRate,
    /// Backoff between failed staking rounds, in milliseconds.
    pub miner_sleep_ms: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            block_max_weight: None,
            block_max_size: None,
            block_priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            block_version: None,
            print_priority: false,
            min_relay_fee: FeeRate::from_sat_per_kb(1000),
            miner_sleep_ms: 500,
        }
    }
}

/// Resolved resource ceilings for one assembler instance.
#[derive(Debug, Clone, Copy)]
pub struct BlockLimits {
    pub max_weight: u64,
    pub max_size: u64,
    /// True when the size ceiling is tighter than the protocol maximum, so
    /// byte accounting has to run alongside weight accounting.
    pub need_size_accounting: bool,
}

impl AssemblerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the configured ceilings.
    ///
    /// If neither knob is set both default; if only the weight is set the
    /// size widens to the protocol maximum; if only the size is set the
    /// weight follows it scaled. Both are then clamped to sane bounds.
    pub fn effective_limits(&self) -> BlockLimits {
        let mut max_weight = DEFAULT_BLOCK_MAX_WEIGHT;
        let mut max_size = DEFAULT_BLOCK_MAX_SIZE;

        if let Some(weight) = self.block_max_weight {
            max_weight = weight;
            max_size = MAX_BLOCK_SERIALIZED_SIZE;
        }
        if let Some(size) = self.block_max_size {
            max_size = size;
            if self.block_max_weight.is_none() {
                max_weight = size.saturating_mul(WITNESS_SCALE_FACTOR);
            }
        }

        let max_weight = max_weight.clamp(4_000, MAX_BLOCK_WEIGHT - 4_000);
        let max_size = max_size.clamp(1_000, MAX_BLOCK_SERIALIZED_SIZE - 1_000);

        BlockLimits {
            max_weight,
            max_size,
            need_size_accounting: max_size < MAX_BLOCK_SERIALIZED_SIZE - 1_000,
        }
    }

    /// Priority-lane budget, never above the size ceiling.
    pub fn priority_size(&self, limits: &BlockLimits) -> u64 {
        self.block_priority_size.min(limits.max_size)
    }
}
