use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{ScriptBuf, Transaction, TxMerkleNode, TxOut};

/// Bytes identifying the witness-commitment output.
const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Merkle root over the block's transaction ids.
pub fn block_merkle_root(txdata: &[Transaction]) -> TxMerkleNode {
    let hashes = txdata.iter().map(|tx| tx.compute_txid().to_raw_hash());
    bitcoin::merkle_tree::calculate_root(hashes)
        .map(TxMerkleNode::from_raw_hash)
        .unwrap_or_else(|| TxMerkleNode::from_byte_array([0u8; 32]))
}

/// Merkle root over wtxids, with the coinbase slot zeroed as consensus
/// requires.
pub fn witness_merkle_root(txdata: &[Transaction]) -> sha256d::Hash {
    let hashes = txdata.iter().enumerate().map(|(i, tx)| {
        if i == 0 {
            sha256d::Hash::all_zeros()
        } else {
            tx.compute_wtxid().to_raw_hash()
        }
    });
    bitcoin::merkle_tree::calculate_root(hashes).unwrap_or_else(sha256d::Hash::all_zeros)
}

/// Appends the witness-commitment output to the coinbase (`txdata[0]`) and
/// installs the reserved witness. Returns the commitment script bytes, or
/// an empty vector when witness rules are not active.
pub fn generate_coinbase_commitment(txdata: &mut [Transaction], witness_enabled: bool) -> Vec<u8> {
    if !witness_enabled || txdata.is_empty() {
        return Vec::new();
    }

    let witness_root = witness_merkle_root(txdata);
    let reserved = [0u8; 32];

    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(witness_root.as_byte_array());
    preimage[32..].copy_from_slice(&reserved);
    let commitment = sha256d::Hash::hash(&preimage);

    let mut payload = [0u8; 36];
    payload[..4].copy_from_slice(&WITNESS_COMMITMENT_HEADER);
    payload[4..].copy_from_slice(commitment.as_byte_array());

    let script = ScriptBuf::builder()
        .push_opcode(bitcoin::opcodes::all::OP_RETURN)
        .push_slice(payload)
        .into_script();

    let coinbase = &mut txdata[0];
    coinbase.input[0].witness = bitcoin::Witness::from_slice(&[reserved]);
    coinbase.output.push(TxOut {
        value: bitcoin::Amount::ZERO,
        script_pubkey: script.clone(),
    });

    script.into_bytes()
}
