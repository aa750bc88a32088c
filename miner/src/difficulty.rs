use bitcoin::CompactTarget;

use ember_core::ChainTip;

/// Next-work oracle. The chain keeps separate difficulty tracks for
/// proof-of-work and proof-of-stake blocks; the assembler only asks for
/// the target of the block it is building.
pub trait DifficultyOracle: Send + Sync {
    fn next_work_required(&self, tip: &ChainTip, proof_of_stake: bool) -> CompactTarget;
}

/// Fixed-difficulty oracle for regtest and tests.
#[derive(Debug, Clone, Copy)]
pub struct ConstantDifficulty {
    pub pow_bits: CompactTarget,
    pub pos_bits: CompactTarget,
}

impl ConstantDifficulty {
    pub fn regtest() -> Self {
        let bits = CompactTarget::from_consensus(0x207f_ffff);
        Self {
            pow_bits: bits,
            pos_bits: bits,
        }
    }
}

impl DifficultyOracle for ConstantDifficulty {
    fn next_work_required(&self, _tip: &ChainTip, proof_of_stake: bool) -> CompactTarget {
        if proof_of_stake {
            self.pos_bits
        } else {
            self.pow_bits
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::BlockHash;

    #[test]
    fn test_constant_oracle_tracks() {
        let oracle = ConstantDifficulty {
            pow_bits: CompactTarget::from_consensus(0x1d00_ffff),
            pos_bits: CompactTarget::from_consensus(0x1e00_ffff),
        };
        let tip = ChainTip {
            height: 0,
            hash: BlockHash::from_byte_array([0u8; 32]),
            time: 0,
            median_time_past: 0,
        };
        assert_eq!(
            oracle.next_work_required(&tip, false).to_consensus(),
            0x1d00_ffff
        );
        assert_eq!(
            oracle.next_work_required(&tip, true).to_consensus(),
            0x1e00_ffff
        );
    }
}
