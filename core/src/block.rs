use bitcoin::block::Header as BlockHeader;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Transaction};

/// Returns true if `tx` has the coinstake shape: it spends a real outpoint
/// and its first output is deliberately empty.
pub fn is_coin_stake(tx: &Transaction) -> bool {
    if tx.input.is_empty() || tx.output.len() < 2 {
        return false;
    }
    if tx.input[0].previous_output.is_null() {
        return false;
    }
    let first = &tx.output[0];
    first.value.to_sat() == 0 && first.script_pubkey.is_empty()
}

/// A block whose transactions carry individual timestamps, as required by
/// the proof-of-stake kernel. `tx_times` is parallel to `txdata`; the
/// `signature` field is empty for proof-of-work blocks and holds the
/// staker's signature over the block hash otherwise.
#[derive(Debug, Clone)]
pub struct TimedBlock {
    pub header: BlockHeader,
    pub txdata: Vec<Transaction>,
    pub tx_times: Vec<u32>,
    pub signature: Vec<u8>,
}

impl Default for TimedBlock {
    fn default() -> Self {
        Self {
            header: BlockHeader {
                version: bitcoin::block::Version::from_consensus(0),
                prev_blockhash: BlockHash::from_byte_array([0u8; 32]),
                merkle_root: bitcoin::TxMerkleNode::from_byte_array([0u8; 32]),
                time: 0,
                bits: bitcoin::CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata: Vec::new(),
            tx_times: Vec::new(),
            signature: Vec::new(),
        }
    }
}

impl TimedBlock {
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    /// A proof-of-stake block carries its coinstake at index 1.
    pub fn is_proof_of_stake(&self) -> bool {
        self.txdata.len() > 1 && is_coin_stake(&self.txdata[1])
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    /// Latest transaction timestamp in the block; the PoS header time must
    /// not fall below this.
    pub fn max_transaction_time(&self) -> u32 {
        self.tx_times.iter().copied().max().unwrap_or(0)
    }
}
