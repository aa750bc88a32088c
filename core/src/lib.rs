//! # Ember Core Library
//!
//! Consensus-side building blocks for the Ember hybrid PoW/PoS node.
//!
//! This library provides the leaf components the block assembler and the
//! staker consume: chain parameters, the subsidy and stake-reward schedule,
//! the timed block type, merkle roots and the witness commitment, legacy
//! sigop counting, locktime finality, and fee-rate arithmetic.

pub mod block;
pub mod chain;
pub mod error;
pub mod fee;
pub mod locktime;
pub mod merkle;
pub mod params;
pub mod sigops;
pub mod subsidy;
pub mod time;

pub use block::TimedBlock;
pub use chain::{ChainState, ChainTip};
pub use error::CoreError;
pub use fee::FeeRate;
pub use locktime::is_final_tx;
pub use merkle::{block_merkle_root, generate_coinbase_commitment, witness_merkle_root};
pub use params::{ChainParams, Network};
pub use sigops::get_legacy_sig_op_count;
pub use subsidy::{get_block_subsidy, get_proof_of_stake_reward};
pub use time::{SystemTimeSource, TimeSource};
