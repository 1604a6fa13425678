//! Fixed-width bit sets over leaf indices.

use serde::{Deserialize, Serialize};

/// Set of leaves below a node (a clade).
///
/// Sets built for the same tree share a width, so equality and ordering are
/// plain word comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafSet {
    words: Vec<u64>,
}

impl LeafSet {
    /// Empty set able to hold `nleaves` leaves.
    pub fn empty(nleaves: usize) -> Self {
        Self {
            words: vec![0; nleaves.div_ceil(64).max(1)],
        }
    }

    /// Set holding only `leaf`.
    pub fn singleton(leaf: usize, nleaves: usize) -> Self {
        let mut set = Self::empty(nleaves);
        set.insert(leaf);
        set
    }

    /// Adds `leaf`.
    pub fn insert(&mut self, leaf: usize) {
        self.words[leaf / 64] |= 1u64 << (leaf % 64);
    }

    /// Whether `leaf` is a member.
    pub fn contains(&self, leaf: usize) -> bool {
        self.words
            .get(leaf / 64)
            .is_some_and(|w| w & (1u64 << (leaf % 64)) != 0)
    }

    /// Adds every member of `other`.
    pub fn union_with(&mut self, other: &LeafSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &LeafSet) -> LeafSet {
        LeafSet {
            words: self
                .words
                .iter()
                .zip(&other.words)
                .map(|(a, b)| a & !b)
                .collect(),
        }
    }

    /// Whether every member of `self` is in `other`.
    pub fn is_subset(&self, other: &LeafSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & !b == 0)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Members in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| idx * 64 + bit)
        })
    }
}
