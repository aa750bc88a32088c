use bitcoin::{Sequence, Transaction};

/// Locktime values below this are block heights, above are unix times.
const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Whether `tx` is final for inclusion in a block at `height` whose
/// locktime cutoff (median time past, or block time on old rules) is
/// `lock_time_cutoff`.
pub fn is_final_tx(tx: &Transaction, height: u32, lock_time_cutoff: u32) -> bool {
    let lock_time = tx.lock_time.to_consensus_u32();
    if lock_time == 0 {
        return true;
    }

    let cutoff = if lock_time < LOCKTIME_THRESHOLD {
        height
    } else {
        lock_time_cutoff
    };
    if lock_time < cutoff {
        return true;
    }

    // A locktime in the future is still final when every input opted out.
    tx.input.iter().all(|txin| txin.sequence == Sequence::MAX)
}
