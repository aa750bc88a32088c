use std::collections::{BTreeSet, HashMap, VecDeque};

use anyhow::{bail, Result};
use bitcoin::{Transaction, Txid};
use tracing::debug;

use crate::entry::{compare_ancestor_score, MempoolEntry};

/// Pool of unconfirmed transactions. Entries are trusted as accepted; this
/// structure only maintains the parent/child graph and the per-entry
/// ancestor aggregates the block assembler reads.
#[derive(Debug, Default)]
pub struct Mempool {
    entries: HashMap<Txid, MempoolEntry>,
    parents: HashMap<Txid, BTreeSet<Txid>>,
    children: HashMap<Txid, BTreeSet<Txid>>,
    // Operator prioritisation deltas, kept across entry removal.
    deltas: HashMap<Txid, (f64, i64)>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Txid) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    /// Direct in-pool parents of `txid`.
    pub fn get_parents(&self, txid: &Txid) -> BTreeSet<Txid> {
        self.parents.get(txid).cloned().unwrap_or_default()
    }

    /// Direct in-pool children of `txid`.
    pub fn get_children(&self, txid: &Txid) -> BTreeSet<Txid> {
        self.children.get(txid).cloned().unwrap_or_default()
    }

    /// Every unconfirmed ancestor of `txid`, excluding `txid` itself.
    pub fn calculate_ancestors(&self, txid: &Txid) -> BTreeSet<Txid> {
        self.walk(txid, &self.parents)
    }

    /// Every in-pool descendant of `txid`, excluding `txid` itself.
    pub fn calculate_descendants(&self, txid: &Txid) -> BTreeSet<Txid> {
        self.walk(txid, &self.children)
    }

    fn walk(&self, txid: &Txid, edges: &HashMap<Txid, BTreeSet<Txid>>) -> BTreeSet<Txid> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<Txid> = edges.get(txid).into_iter().flatten().copied().collect();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                if let Some(more) = edges.get(&next) {
                    queue.extend(more.iter().copied());
                }
            }
        }

        seen
    }

    /// Accept an entry whose parents (if any) are already in the pool. The
    /// entry's cached aggregates are completed with the contributions of
    /// every unconfirmed ancestor.
    pub fn add_entry(&mut self, mut entry: MempoolEntry) -> Result<()> {
        let txid = entry.txid;
        if self.entries.contains_key(&txid) {
            bail!("transaction {} already in mempool", txid);
        }

        let mut parents = BTreeSet::new();
        for txin in &entry.tx.input {
            let parent = txin.previous_output.txid;
            if self.entries.contains_key(&parent) {
                parents.insert(parent);
            }
        }

        for parent in parents.iter() {
            self.children.entry(*parent).or_default().insert(txid);
        }
        self.parents.insert(txid, parents);

        for ancestor in self.calculate_ancestors(&txid) {
            let anc = &self.entries[&ancestor];
            entry.count_with_ancestors += 1;
            entry.size_with_ancestors += anc.size;
            entry.weight_with_ancestors += anc.weight;
            entry.mod_fees_with_ancestors += anc.mod_fee;
            entry.sigops_with_ancestors += anc.sigop_cost;
        }

        if let Some((_, fee_delta)) = self.deltas.get(&txid) {
            entry.mod_fee += fee_delta;
            entry.mod_fees_with_ancestors += fee_delta;
        }

        debug!(
            "mempool accepted {} (fee {} sat, {} ancestors)",
            txid,
            entry.fee.to_sat(),
            entry.count_with_ancestors - 1
        );
        self.entries.insert(txid, entry);
        Ok(())
    }

    /// Remove an entry, fixing up the cached ancestor aggregates of every
    /// descendant it participated in.
    pub fn remove_entry(&mut self, txid: &Txid) -> Option<Transaction> {
        let entry = self.entries.remove(txid)?;

        for desc in self.calculate_descendants(txid) {
            if let Some(d) = self.entries.get_mut(&desc) {
                d.count_with_ancestors -= 1;
                d.size_with_ancestors -= entry.size;
                d.weight_with_ancestors -= entry.weight;
                d.mod_fees_with_ancestors -= entry.mod_fee;
                d.sigops_with_ancestors -= entry.sigop_cost;
            }
        }

        if let Some(parents) = self.parents.remove(txid) {
            for parent in parents {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.remove(txid);
                }
            }
        }
        if let Some(children) = self.children.remove(txid) {
            for child in children {
                if let Some(uplinks) = self.parents.get_mut(&child) {
                    uplinks.remove(txid);
                }
            }
        }

        Some(entry.tx)
    }

    /// Register an operator bias for `txid`. Applied immediately when the
    /// entry is present (to it and to every descendant's ancestor fees) and
    /// remembered for a later arrival otherwise.
    pub fn prioritise_transaction(&mut self, txid: &Txid, priority_delta: f64, fee_delta: i64) {
        let slot = self.deltas.entry(*txid).or_insert((0.0, 0));
        slot.0 += priority_delta;
        slot.1 += fee_delta;

        if self.entries.contains_key(txid) {
            if let Some(entry) = self.entries.get_mut(txid) {
                entry.mod_fee += fee_delta;
                entry.mod_fees_with_ancestors += fee_delta;
            }
            for desc in self.calculate_descendants(txid) {
                if let Some(d) = self.entries.get_mut(&desc) {
                    d.mod_fees_with_ancestors += fee_delta;
                }
            }
        }

        debug!(
            "prioritised {}: priority {:+}, fee {:+} sat",
            txid, priority_delta, fee_delta
        );
    }

    /// Operator deltas for `txid`, `(priority_delta, fee_delta)`.
    pub fn apply_deltas(&self, txid: &Txid) -> (f64, i64) {
        self.deltas.get(txid).copied().unwrap_or((0.0, 0))
    }

    /// Every txid, ordered by descending ancestor-package score. This is
    /// the snapshot the selector walks; it does not change as selection
    /// proceeds.
    pub fn ancestor_score_order(&self) -> Vec<Txid> {
        let mut order: Vec<Txid> = self.entries.keys().copied().collect();
        order.sort_by(|a, b| {
            let ea = &self.entries[a];
            let eb = &self.entries[b];
            compare_ancestor_score(
                eb.mod_fees_with_ancestors,
                eb.size_with_ancestors,
                b,
                ea.mod_fees_with_ancestors,
                ea.size_with_ancestors,
                a,
            )
        });
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MempoolEntryBuilder;
    use bitcoin::hashes::Hash;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Witness};

    fn tx_spending(prevouts: &[(Txid, u32)], outputs: u32, salt: u64) -> Transaction {
        let input = prevouts
            .iter()
            .map(|(txid, vout)| TxIn {
                previous_output: OutPoint {
                    txid: *txid,
                    vout: *vout,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect();
        let output = (0..outputs)
            .map(|i| TxOut {
                value: Amount::from_sat(10_000 + salt + i as u64),
                script_pubkey: ScriptBuf::new(),
            })
            .collect();
        Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input,
            output,
        }
    }

    fn confirmed_outpoint(tag: u8) -> (Txid, u32) {
        (Txid::from_byte_array([tag; 32]), 0)
    }

    fn add(pool: &mut Mempool, tx: Transaction, fee: u64) -> Txid {
        let entry = MempoolEntryBuilder::new()
            .fee(Amount::from_sat(fee))
            .build(tx);
        let txid = entry.txid;
        pool.add_entry(entry).unwrap();
        txid
    }

    #[test]
    fn test_chain_aggregates() {
        let mut pool = Mempool::new();

        let parent_tx = tx_spending(&[confirmed_outpoint(1)], 2, 0);
        let parent = add(&mut pool, parent_tx.clone(), 1_000);
        let child_tx = tx_spending(&[(parent, 0)], 1, 1);
        let child = add(&mut pool, child_tx.clone(), 5_000);
        let grandchild_tx = tx_spending(&[(child, 0)], 1, 2);
        let grandchild = add(&mut pool, grandchild_tx, 2_000);

        let gc = pool.get(&grandchild).unwrap();
        assert_eq!(gc.count_with_ancestors, 3);
        assert_eq!(gc.mod_fees_with_ancestors, 8_000);
        assert_eq!(
            gc.size_with_ancestors,
            pool.get(&parent).unwrap().size + pool.get(&child).unwrap().size + gc.size
        );

        assert_eq!(pool.calculate_ancestors(&grandchild).len(), 2);
        assert_eq!(pool.calculate_descendants(&parent).len(), 2);
        assert_eq!(pool.get_children(&parent), [child].into());
        assert_eq!(pool.get_parents(&child), [parent].into());
    }

    #[test]
    fn test_remove_updates_descendants() {
        let mut pool = Mempool::new();

        let parent = add(&mut pool, tx_spending(&[confirmed_outpoint(1)], 1, 0), 1_000);
        let child_tx = tx_spending(&[(parent, 0)], 1, 1);
        let child = add(&mut pool, child_tx, 5_000);

        assert!(pool.remove_entry(&parent).is_some());

        let c = pool.get(&child).unwrap();
        assert_eq!(c.count_with_ancestors, 1);
        assert_eq!(c.mod_fees_with_ancestors, 5_000);
        assert_eq!(c.size_with_ancestors, c.size);
        assert!(pool.get_parents(&child).is_empty());
    }

    #[test]
    fn test_prioritise_lifts_descendants() {
        let mut pool = Mempool::new();

        let parent = add(&mut pool, tx_spending(&[confirmed_outpoint(1)], 1, 0), 1_000);
        let child = add(&mut pool, tx_spending(&[(parent, 0)], 1, 1), 2_000);

        pool.prioritise_transaction(&parent, 0.0, 10_000);

        assert_eq!(pool.get(&parent).unwrap().mod_fee, 11_000);
        assert_eq!(pool.get(&child).unwrap().mod_fees_with_ancestors, 13_000);
        assert_eq!(pool.apply_deltas(&parent), (0.0, 10_000));
    }

    #[test]
    fn test_delta_applies_on_later_arrival() {
        let mut pool = Mempool::new();

        let tx = tx_spending(&[confirmed_outpoint(9)], 1, 0);
        let txid = tx.compute_txid();
        pool.prioritise_transaction(&txid, 5.0, 7_000);
        add(&mut pool, tx, 1_000);

        let entry = pool.get(&txid).unwrap();
        assert_eq!(entry.mod_fee, 8_000);
        assert_eq!(entry.mod_fees_with_ancestors, 8_000);
    }

    #[test]
    fn test_ancestor_score_order() {
        let mut pool = Mempool::new();

        // Low-fee parent, high-fee child: the child's package rate lands
        // between its own rate and the parent's.
        let parent = add(&mut pool, tx_spending(&[confirmed_outpoint(1)], 1, 0), 100);
        let child = add(&mut pool, tx_spending(&[(parent, 0)], 1, 1), 50_000);
        let loner = add(&mut pool, tx_spending(&[confirmed_outpoint(2)], 1, 2), 10_000);

        let order = pool.ancestor_score_order();
        assert_eq!(order.len(), 3);
        // The standalone 10k tx and the child package both beat the bare
        // parent.
        assert_eq!(*order.last().unwrap(), parent);
        assert!(order[..2].contains(&child));
        assert!(order[..2].contains(&loner));

        // Deterministic across calls.
        assert_eq!(order, pool.ancestor_score_order());
    }
}
