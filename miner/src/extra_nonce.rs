use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::{BlockHash, ScriptBuf};

use ember_core::params::{COINBASE_FLAGS, MAX_COINBASE_SCRIPT_SIG_SIZE};
use ember_core::{block_merkle_root, TimedBlock};

/// Rolls the extra nonce in the coinbase script sig between hashing
/// attempts. The previous-hash memo resets the counter whenever the tip
/// moves, so equal tips always explore the same search space.
#[derive(Debug)]
pub struct ExtraNonce {
    last_prev_hash: BlockHash,
    extra_nonce: u32,
}

impl Default for ExtraNonce {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtraNonce {
    pub fn new() -> Self {
        Self {
            last_prev_hash: BlockHash::from_byte_array([0u8; 32]),
            extra_nonce: 0,
        }
    }

    /// Bump the extra nonce, rewrite the coinbase script sig as
    /// `<height> <extraNonce> || COINBASE_FLAGS` and refresh the merkle
    /// root. Returns the nonce used.
    pub fn increment(&mut self, block: &mut TimedBlock, height: u32) -> u32 {
        if self.last_prev_hash != block.header.prev_blockhash {
            self.extra_nonce = 0;
            self.last_prev_hash = block.header.prev_blockhash;
        }
        self.extra_nonce += 1;

        let mut script_sig = ScriptBuf::builder()
            .push_int(height as i64)
            .push_int(self.extra_nonce as i64)
            .into_script()
            .into_bytes();
        let mut flags = PushBytesBuf::new();
        flags
            .extend_from_slice(COINBASE_FLAGS)
            .expect("coinbase flags fit a push");
        script_sig.extend_from_slice(
            ScriptBuf::builder()
                .push_slice(flags)
                .into_script()
                .as_bytes(),
        );
        assert!(script_sig.len() <= MAX_COINBASE_SCRIPT_SIG_SIZE);

        block.txdata[0].input[0].script_sig = ScriptBuf::from_bytes(script_sig);
        block.header.merkle_root = block_merkle_root(&block.txdata);

        self.extra_nonce
    }
}
