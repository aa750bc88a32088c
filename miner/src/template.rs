use bitcoin::{Amount, ScriptBuf};

use ember_core::TimedBlock;

/// What kind of block to assemble. Proof-of-work pays the caller's script;
/// proof-of-stake leaves the coinbase empty and reports the reward the
/// signer must place in the coinstake.
#[derive(Debug, Clone)]
pub enum BlockMode {
    ProofOfWork { script_pubkey: ScriptBuf },
    ProofOfStake,
}

impl BlockMode {
    pub fn is_proof_of_stake(&self) -> bool {
        matches!(self, BlockMode::ProofOfStake)
    }
}

/// The assembler's product: a block ready to be mined or signed, plus the
/// per-transaction bookkeeping miners and the staker read back.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: TimedBlock,
    /// Fee of each transaction; the coinbase slot holds the negated total.
    pub tx_fees: Vec<i64>,
    /// Sigop cost of each transaction.
    pub tx_sigops: Vec<i64>,
    /// Witness-commitment script bytes, empty pre-segwit.
    pub coinbase_commitment: Vec<u8>,
    pub height: u32,
    pub total_fees: Amount,
    /// Reward owed to the coinstake; `Some` exactly for PoS templates.
    pub stake_reward: Option<Amount>,
}

impl BlockTemplate {
    /// Transactions excluding the coinbase.
    pub fn tx_count(&self) -> u64 {
        self.block.txdata.len().saturating_sub(1) as u64
    }
}
