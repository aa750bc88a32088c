use std::cmp::Ordering;

use bitcoin::{Amount, Transaction, Txid};

/// A mempool entry together with the cached aggregates over the entry and
/// all of its unconfirmed ancestors. The aggregates are maintained
/// incrementally as transactions enter and leave the pool, so the assembler
/// can read package numbers without walking the graph.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Txid,
    /// Timestamp carried inside the transaction (stake kernel input).
    pub tx_time: u32,
    pub fee: Amount,
    /// Fee plus the operator's prioritisation delta, in satoshis. May go
    /// negative.
    pub mod_fee: i64,
    /// Serialized size in bytes.
    pub size: u64,
    pub weight: u64,
    pub sigop_cost: i64,
    /// Wall-clock time the entry was accepted.
    pub time: u64,
    pub entry_height: u32,
    /// Coin-age priority at entry time.
    pub entry_priority: f64,
    /// Total value of confirmed inputs, for priority aging.
    pub in_chain_input_value: Amount,

    pub count_with_ancestors: u64,
    pub size_with_ancestors: u64,
    pub weight_with_ancestors: u64,
    pub mod_fees_with_ancestors: i64,
    pub sigops_with_ancestors: i64,
}

impl MempoolEntry {
    /// Coin-age priority at `height`: the cached entry priority plus the
    /// value-weighted age the inputs gained since entry.
    pub fn priority(&self, height: u32) -> f64 {
        if height <= self.entry_height || self.size == 0 {
            return self.entry_priority;
        }
        let delta_height = (height - self.entry_height) as f64;
        self.entry_priority
            + delta_height * self.in_chain_input_value.to_sat() as f64 / self.size as f64
    }

    pub fn has_witness(&self) -> bool {
        self.tx.input.iter().any(|txin| !txin.witness.is_empty())
    }
}

/// Compare two candidates by ancestor-package fee rate, higher first. Uses
/// the cross-multiplication form to stay exact over integers; ties fall
/// back to txid order so the result is a total order.
pub fn compare_ancestor_score(
    fees_a: i64,
    size_a: u64,
    txid_a: &Txid,
    fees_b: i64,
    size_b: u64,
    txid_b: &Txid,
) -> Ordering {
    let lhs = fees_a as i128 * size_b as i128;
    let rhs = fees_b as i128 * size_a as i128;
    match lhs.cmp(&rhs) {
        // Lower txid ranks higher so iteration order is stable.
        Ordering::Equal => txid_b.cmp(txid_a),
        ord => ord,
    }
}

/// Builder for mempool entries. The pool derives the ancestor aggregates on
/// insertion; the builder seeds them with the entry's own contribution.
#[derive(Debug, Clone)]
pub struct MempoolEntryBuilder {
    fee: Amount,
    tx_time: u32,
    time: u64,
    height: u32,
    priority: f64,
    input_value: Amount,
    sigop_cost: Option<i64>,
}

impl Default for MempoolEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MempoolEntryBuilder {
    pub fn new() -> Self {
        Self {
            fee: Amount::ZERO,
            tx_time: 0,
            time: 0,
            height: 0,
            priority: 0.0,
            input_value: Amount::ZERO,
            sigop_cost: None,
        }
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn tx_time(mut self, tx_time: u32) -> Self {
        self.tx_time = tx_time;
        self
    }

    pub fn time(mut self, time: u64) -> Self {
        self.time = time;
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn input_value(mut self, value: Amount) -> Self {
        self.input_value = value;
        self
    }

    pub fn sigop_cost(mut self, sigop_cost: i64) -> Self {
        self.sigop_cost = Some(sigop_cost);
        self
    }

    pub fn build(self, tx: Transaction) -> MempoolEntry {
        let txid = tx.compute_txid();
        let size = bitcoin::consensus::encode::serialize(&tx).len() as u64;
        let weight = tx.weight().to_wu();
        let sigop_cost = self.sigop_cost.unwrap_or_else(|| {
            ember_core::params::WITNESS_SCALE_FACTOR as i64
                * ember_core::get_legacy_sig_op_count(&tx)
        });
        let fee_sat = self.fee.to_sat() as i64;

        MempoolEntry {
            tx,
            txid,
            tx_time: self.tx_time,
            fee: self.fee,
            mod_fee: fee_sat,
            size,
            weight,
            sigop_cost,
            time: self.time,
            entry_height: self.height,
            entry_priority: self.priority,
            in_chain_input_value: self.input_value,
            count_with_ancestors: 1,
            size_with_ancestors: size,
            weight_with_ancestors: weight,
            mod_fees_with_ancestors: fee_sat,
            sigops_with_ancestors: sigop_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Witness};

    fn dummy_tx(tag: u8) -> Transaction {
        Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([tag; 32]),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(1000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[test]
    fn test_priority_ages_with_height() {
        let entry = MempoolEntryBuilder::new()
            .height(100)
            .priority(10.0)
            .input_value(Amount::from_sat(1_000_000))
            .build(dummy_tx(1));

        assert_eq!(entry.priority(100), 10.0);
        let aged = entry.priority(110);
        assert!(aged > 10.0);
        assert_eq!(
            aged,
            10.0 + 10.0 * 1_000_000.0 / entry.size as f64
        );
    }

    #[test]
    fn test_score_ordering_exact() {
        let a = dummy_tx(1).compute_txid();
        let b = dummy_tx(2).compute_txid();

        // 300/100 beats 200/100.
        assert_eq!(
            compare_ancestor_score(300, 100, &a, 200, 100, &b),
            Ordering::Greater
        );
        // 1/3 vs 333/1000: cross multiplication keeps this exact where a
        // float division would tie.
        assert_eq!(
            compare_ancestor_score(1, 3, &a, 333, 1000, &b),
            Ordering::Greater
        );
    }

    #[test]
    fn test_score_tie_breaks_by_txid() {
        let a = dummy_tx(1).compute_txid();
        let b = dummy_tx(2).compute_txid();
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };

        assert_eq!(
            compare_ancestor_score(100, 100, &lo, 100, 100, &hi),
            Ordering::Greater
        );
        assert_eq!(
            compare_ancestor_score(100, 100, &hi, 100, 100, &lo),
            Ordering::Less
        );
    }
}
