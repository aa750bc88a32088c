//! Block template assembly for the Ember hybrid PoW/PoS chain.
//!
//! The assembler turns the chain tip plus the mempool into a candidate
//! block: a coin-age priority pre-pass, then ancestor-package selection
//! under weight / size / sigop ceilings, then coinbase and header
//! finalization. The staker drives the same path for proof-of-stake blocks
//! and hands the result to the wallet for signing.

pub mod assembler;
pub mod config;
pub mod difficulty;
pub mod extra_nonce;
pub mod modified;
pub mod staker;
pub mod stats;
pub mod submit;
pub mod template;

pub use assembler::BlockAssembler;
pub use config::{AssemblerConfig, BlockLimits};
pub use difficulty::{ConstantDifficulty, DifficultyOracle};
pub use extra_nonce::ExtraNonce;
pub use staker::{CoinStake, NetworkStatus, Staker, StakeWallet};
pub use stats::MinerStats;
pub use submit::{check_stake, check_work, BlockAcceptor, StakeVerifier};
pub use template::{BlockMode, BlockTemplate};
