use bitcoin::Amount;

use crate::params::ChainParams;

/// Block subsidy paid to a proof-of-work coinbase at the given height.
pub fn get_block_subsidy(height: u32, params: &ChainParams) -> Amount {
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return Amount::ZERO;
    }
    Amount::from_sat(params.initial_subsidy.to_sat() >> halvings)
}

/// Reward minted for a proof-of-stake block at the given height.
pub fn get_proof_of_stake_reward(_height: u32, params: &ChainParams) -> Amount {
    params.proof_of_stake_reward
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::COIN;

    #[test]
    fn test_subsidy_halving_schedule() {
        let params = ChainParams::main();

        assert_eq!(get_block_subsidy(0, &params), Amount::from_sat(50 * COIN));
        assert_eq!(
            get_block_subsidy(210_000, &params),
            Amount::from_sat(25 * COIN)
        );
        assert_eq!(
            get_block_subsidy(420_000, &params),
            Amount::from_sat(25 * COIN / 2)
        );
        // Far future: subsidy runs out entirely.
        assert_eq!(
            get_block_subsidy(64 * 210_000, &params),
            Amount::ZERO
        );
    }

    #[test]
    fn test_stake_reward_is_flat() {
        let params = ChainParams::main();
        assert_eq!(
            get_proof_of_stake_reward(1, &params),
            get_proof_of_stake_reward(1_000_000, &params)
        );
    }
}
