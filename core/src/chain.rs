use bitcoin::BlockHash;

use crate::params::ChainParams;

/// Snapshot of the active chain tip, captured once per template build.
#[derive(Debug, Clone, Copy)]
pub struct ChainTip {
    pub height: u32,
    pub hash: BlockHash,
    /// Timestamp of the tip block.
    pub time: u32,
    /// Median time past over the tip's last 11 blocks.
    pub median_time_past: u32,
}

/// Mutable view of the active chain as the assembler sees it. Holding the
/// outer lock on this for the duration of a template build is what makes
/// the mempool snapshot coherent.
#[derive(Debug, Clone)]
pub struct ChainState {
    tip: ChainTip,
}

impl ChainState {
    pub fn new(tip: ChainTip) -> Self {
        Self { tip }
    }

    pub fn tip(&self) -> ChainTip {
        self.tip
    }

    pub fn set_tip(&mut self, tip: ChainTip) {
        self.tip = tip;
    }

    /// Whether witness data may be committed to blocks built on the tip.
    pub fn is_witness_enabled(&self, params: &ChainParams) -> bool {
        params.is_witness_enabled(self.tip.height + 1)
    }

    /// Version word for a block built on the tip. Top bits signal
    /// version-bits deployments; none are in flight.
    pub fn compute_block_version(&self) -> i32 {
        0x2000_0000
    }
}
