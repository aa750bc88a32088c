use anyhow::{bail, Result};
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{CompactTarget, Target, Transaction};
use tokio::sync::RwLock;
use tracing::info;

use ember_core::{ChainState, TimedBlock};

/// Hands finished blocks to chain acceptance, the same path a block from a
/// peer takes.
#[async_trait]
pub trait BlockAcceptor: Send + Sync {
    async fn process_new_block(&self, block: &TimedBlock) -> Result<bool>;
}

/// Re-verifies a coinstake's kernel proof before submission.
pub trait StakeVerifier: Send + Sync {
    fn check_proof_of_stake(
        &self,
        coinstake: &Transaction,
        coinstake_time: u32,
        bits: CompactTarget,
    ) -> Result<()>;
}

/// Validate and submit a solved proof-of-work block. The template is
/// discarded on any failure; the caller just logs and keeps mining.
pub async fn check_work(
    chain: &RwLock<ChainState>,
    acceptor: &dyn BlockAcceptor,
    block: &TimedBlock,
) -> Result<()> {
    let hash = block.block_hash();

    if !block.is_proof_of_work() {
        bail!("{} is not a proof-of-work block", hash);
    }

    let target = Target::from_compact(block.header.bits);
    if Target::from_le_bytes(hash.to_byte_array()) > target {
        bail!("block {} proof-of-work not meeting target", hash);
    }

    {
        let chain = chain.read().await;
        if block.header.prev_blockhash != chain.tip().hash {
            bail!("generated block is stale");
        }
    }

    if !acceptor.process_new_block(block).await? {
        bail!("block not accepted");
    }

    Ok(())
}

/// Validate and submit a signed proof-of-stake block: re-check the kernel
/// proof, re-check the tip didn't move during assembly, then submit.
pub async fn check_stake(
    chain: &RwLock<ChainState>,
    verifier: &dyn StakeVerifier,
    acceptor: &dyn BlockAcceptor,
    block: &TimedBlock,
) -> Result<()> {
    let hash = block.block_hash();

    if !block.is_proof_of_stake() {
        bail!("{} is not a proof-of-stake block", hash);
    }

    verifier.check_proof_of_stake(&block.txdata[1], block.tx_times[1], block.header.bits)?;

    info!("new proof-of-stake block found hash: {}", hash);

    {
        let chain = chain.read().await;
        if block.header.prev_blockhash != chain.tip().hash {
            bail!("generated block is stale");
        }
    }

    if !acceptor.process_new_block(block).await? {
        bail!("block not accepted");
    }

    Ok(())
}
