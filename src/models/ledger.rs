use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::hash::Hash;

/// Debt sums keyed by package / tag / rule. Keys keep the order in which they
/// were first seen so that stable rankings break ties by first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtLedger<K: Eq + Hash + Clone> {
    entries: Vec<(K, f64)>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> Default for DebtLedger<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> DebtLedger<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-zero-and-add.
    pub fn add(&mut self, key: K, amount: f64) {
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 += amount,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, amount));
            }
        }
    }

    pub fn get(&self, key: &K) -> f64 {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn merge(&mut self, other: &DebtLedger<K>) {
        for (key, value) in other.iter() {
            self.add(key.clone(), value);
        }
    }

    /// Entries sorted descending by value; ties keep first-seen order.
    pub fn ranked(&self) -> Vec<(K, f64)> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl<K: Eq + Hash + Clone + Serialize> Serialize for DebtLedger<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}
