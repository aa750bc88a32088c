use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Consensus error: {0}")]
    ConsensusError(String),

    #[error("Chain error: {0}")]
    ChainError(String),

    #[error("Staking error: {0}")]
    StakingError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
