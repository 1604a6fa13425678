//! Per-time lineage counts of a local tree.

use crate::tree::LocalTree;

/// Lineage counts derived from one tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineageCounts {
    /// Branches alive during each half-step (`2 * ntimes - 1` entries). The
    /// root branch extends to the end of time.
    pub nbranches: Vec<usize>,
    /// Branches a new lineage can join at each time point.
    pub ncoals: Vec<usize>,
    /// Branches that can host a recombination at each time point.
    pub nrecombs: Vec<usize>,
}

impl LineageCounts {
    fn zeros(ntimes: usize) -> Self {
        Self {
            nbranches: vec![0; 2 * ntimes - 1],
            ncoals: vec![0; ntimes],
            nrecombs: vec![0; ntimes],
        }
    }

    fn add_branch(&mut self, age: usize, top: Option<usize>) {
        let nsteps = self.nbranches.len();
        let ntimes = self.ncoals.len();
        match top {
            Some(top) => {
                for h in 2 * age..(2 * top).min(nsteps) {
                    self.nbranches[h] += 1;
                }
                for k in age..=top.min(ntimes - 1) {
                    self.ncoals[k] += 1;
                }
                for k in age..top.min(ntimes) {
                    self.nrecombs[k] += 1;
                }
            }
            None => {
                for h in 2 * age..nsteps {
                    self.nbranches[h] += 1;
                }
                for k in age..ntimes {
                    self.ncoals[k] += 1;
                }
            }
        }
    }

    /// Counts for the whole tree.
    pub fn count(tree: &LocalTree, ntimes: usize) -> Self {
        let mut counts = Self::zeros(ntimes);
        for node in 0..tree.nnodes() {
            let top = tree.parent(node).map(|p| tree.age(p));
            counts.add_branch(tree.age(node), top);
        }
        counts
    }

    /// Counts for the tree left after removing the branch above
    /// `recomb_node` together with its subtree. The surviving sibling joins
    /// its former grandparent.
    pub fn count_broken(tree: &LocalTree, recomb_node: usize, ntimes: usize) -> Self {
        let mut counts = Self::zeros(ntimes);
        let Some(broken) = tree.parent(recomb_node) else {
            return counts;
        };
        for node in 0..tree.nnodes() {
            if node == broken || tree.is_descendant(node, recomb_node) {
                continue;
            }
            let top = crate::spr::broken_parent(tree, recomb_node, node).map(|p| tree.age(p));
            counts.add_branch(tree.age(node), top);
        }
        counts
    }
}
