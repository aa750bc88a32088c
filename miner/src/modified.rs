use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use bitcoin::Txid;

use ember_mempool::{compare_ancestor_score, MempoolEntry};

/// A candidate whose ancestor-package state has drifted from the mempool's
/// cached view because some of its ancestors were already committed to the
/// block. Starts from the cached aggregates and loses exactly the included
/// ancestors' own contributions.
#[derive(Debug, Clone)]
pub struct ModifiedEntry {
    pub txid: Txid,
    pub size_with_ancestors: u64,
    pub weight_with_ancestors: u64,
    pub mod_fees_with_ancestors: i64,
    pub sigops_with_ancestors: i64,
}

impl ModifiedEntry {
    pub fn from_entry(entry: &MempoolEntry) -> Self {
        Self {
            txid: entry.txid,
            size_with_ancestors: entry.size_with_ancestors,
            weight_with_ancestors: entry.weight_with_ancestors,
            mod_fees_with_ancestors: entry.mod_fees_with_ancestors,
            sigops_with_ancestors: entry.sigops_with_ancestors,
        }
    }

    /// Subtract one just-included ancestor's own contribution. Exact by
    /// construction: only aggregates that counted the ancestor lose it.
    pub fn update_for_parent_inclusion(&mut self, parent: &MempoolEntry) {
        self.size_with_ancestors -= parent.size;
        self.weight_with_ancestors -= parent.weight;
        self.mod_fees_with_ancestors -= parent.mod_fee;
        self.sigops_with_ancestors -= parent.sigop_cost;
    }
}

/// Key ordering the score index best-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScoreKey {
    mod_fees: i64,
    size: u64,
    txid: Txid,
}

impl ScoreKey {
    fn of(entry: &ModifiedEntry) -> Self {
        Self {
            mod_fees: entry.mod_fees_with_ancestors,
            size: entry.size_with_ancestors,
            txid: entry.txid,
        }
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse the score order so the set iterates best-first.
        compare_ancestor_score(
            other.mod_fees,
            other.size,
            &other.txid,
            self.mod_fees,
            self.size,
            &self.txid,
        )
    }
}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The modified-package index: lookup by txid for exact updates and
/// removal, ordered iteration by ancestor-adjusted score for pop-best.
#[derive(Debug, Default)]
pub struct ModifiedTxSet {
    by_txid: HashMap<Txid, ModifiedEntry>,
    by_score: BTreeSet<ScoreKey>,
}

impl ModifiedTxSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_txid.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_txid.len()
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.by_txid.contains_key(txid)
    }

    pub fn get(&self, txid: &Txid) -> Option<&ModifiedEntry> {
        self.by_txid.get(txid)
    }

    /// Highest-scoring entry.
    pub fn best(&self) -> Option<&ModifiedEntry> {
        let key = self.by_score.iter().next()?;
        self.by_txid.get(&key.txid)
    }

    pub fn insert(&mut self, entry: ModifiedEntry) {
        if let Some(old) = self.by_txid.remove(&entry.txid) {
            self.by_score.remove(&ScoreKey::of(&old));
        }
        self.by_score.insert(ScoreKey::of(&entry));
        self.by_txid.insert(entry.txid, entry);
    }

    pub fn remove(&mut self, txid: &Txid) -> Option<ModifiedEntry> {
        let entry = self.by_txid.remove(txid)?;
        self.by_score.remove(&ScoreKey::of(&entry));
        Some(entry)
    }

    /// Mutate an entry in place, keeping the score index consistent.
    pub fn adjust<F>(&mut self, txid: &Txid, f: F)
    where
        F: FnOnce(&mut ModifiedEntry),
    {
        if let Some(mut entry) = self.remove(txid) {
            f(&mut entry);
            self.insert(entry);
        }
    }
}
