//! Subtree-prune-and-regraft events linking neighbouring local trees.

use std::collections::HashMap;

use arg_core::{ArgError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::leafset::LeafSet;
use crate::tree::LocalTree;

/// Node correspondence between a tree and its right neighbour, indexed by
/// the left tree's labels. The broken node maps to `None`.
pub type NodeMapping = Vec<Option<usize>>;

/// One recombination event, in the labels of the tree left of the breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spr {
    /// Branch that carries the recombination.
    pub recomb_node: usize,
    /// Time index of the recombination.
    pub recomb_time: usize,
    /// Branch the pruned lineage re-coalesces onto.
    pub coal_node: usize,
    /// Time index of the re-coalescence.
    pub coal_time: usize,
}

impl Spr {
    /// A lineage that re-coalesces onto its own branch leaves the tree
    /// unchanged.
    pub fn is_invisible(&self) -> bool {
        self.recomb_node == self.coal_node
    }

    /// Checks the event against `tree`.
    pub fn check(&self, tree: &LocalTree, ntimes: usize) -> Result<(), ArgError> {
        let nnodes = tree.nnodes();
        let reject = |code: &str, message: &str| {
            ArgError::Structure(
                ErrorInfo::new(code, message)
                    .with_context("recomb_node", self.recomb_node.to_string())
                    .with_context("recomb_time", self.recomb_time.to_string())
                    .with_context("coal_node", self.coal_node.to_string())
                    .with_context("coal_time", self.coal_time.to_string()),
            )
        };
        if self.recomb_node >= nnodes || self.coal_node >= nnodes {
            return Err(reject("spr-node-range", "SPR node out of range"));
        }
        let Some(broken) = tree.parent(self.recomb_node) else {
            return Err(reject("spr-recomb-root", "recombination on the root branch"));
        };
        if self.recomb_time < tree.age(self.recomb_node) {
            return Err(reject("spr-recomb-time", "recombination below its branch"));
        }
        if self.coal_time < self.recomb_time || self.coal_time >= ntimes {
            return Err(reject("spr-coal-time", "re-coalescence before recombination"));
        }
        if self.is_invisible() {
            if self.coal_time > tree.age(broken) || self.recomb_time >= tree.age(broken) {
                return Err(reject("spr-recomb-time", "event outside its branch"));
            }
            return Ok(());
        }
        if self.recomb_time >= tree.age(broken) {
            return Err(reject("spr-recomb-time", "recombination above its branch"));
        }
        if tree.is_descendant(self.coal_node, self.recomb_node) {
            return Err(reject("spr-coal-subtree", "re-coalescence inside the pruned subtree"));
        }
        let target = broken_target(tree, self.recomb_node, self.coal_node);
        if self.coal_time < tree.age(target) {
            return Err(reject("spr-coal-time", "re-coalescence below the target branch"));
        }
        if let Some(top) = broken_parent(tree, self.recomb_node, target) {
            if self.coal_time > tree.age(top) {
                return Err(reject("spr-coal-time", "re-coalescence above the target branch"));
            }
        }
        Ok(())
    }
}

/// Branch of the broken tree named by `coal_node`; the broken node stands for
/// its surviving child.
fn broken_target(tree: &LocalTree, recomb_node: usize, coal_node: usize) -> usize {
    match (tree.parent(recomb_node), tree.sibling(recomb_node)) {
        (Some(broken), Some(sibling)) if coal_node == broken => sibling,
        _ => coal_node,
    }
}

/// Parent of `node` once the branch above `recomb_node` is removed.
pub fn broken_parent(tree: &LocalTree, recomb_node: usize, node: usize) -> Option<usize> {
    let broken = tree.parent(recomb_node)?;
    let parent = tree.parent(node)?;
    if parent == broken {
        tree.parent(broken)
    } else {
        Some(parent)
    }
}

/// Applies `spr` to `tree`. The broken node becomes the new coalescence node;
/// other labels are unchanged.
pub fn apply_spr(tree: &LocalTree, spr: &Spr, ntimes: usize) -> Result<LocalTree, ArgError> {
    spr.check(tree, ntimes)?;
    if spr.is_invisible() {
        return Ok(tree.clone());
    }
    tree.regraft(spr.recomb_node, spr.coal_node, spr.coal_time)
}

/// Whether two trees share topology and ages, ignoring internal labels.
pub fn same_tree(a: &LocalTree, b: &LocalTree) -> bool {
    a.nleaves() == b.nleaves() && a.clade_ages() == b.clade_ages()
}

/// Maps every node of `a` to the node of `b` with the same clade and age.
pub fn match_nodes(a: &LocalTree, b: &LocalTree) -> Option<Vec<usize>> {
    if a.nnodes() != b.nnodes() {
        return None;
    }
    let index: HashMap<LeafSet, usize> = b
        .leafsets()
        .into_iter()
        .enumerate()
        .map(|(node, set)| (set, node))
        .collect();
    a.leafsets()
        .iter()
        .enumerate()
        .map(|(node, set)| {
            let other = *index.get(set)?;
            (a.age(node) == b.age(other)).then_some(other)
        })
        .collect()
}

/// Derives the node mapping for `prev -> cur` through `spr`, or `None` when
/// the event does not turn `prev` into `cur`.
pub fn link_trees(
    prev: &LocalTree,
    spr: &Spr,
    cur: &LocalTree,
    ntimes: usize,
) -> Option<NodeMapping> {
    let expected = apply_spr(prev, spr, ntimes).ok()?;
    let matched = match_nodes(&expected, cur)?;
    let broken = prev.parent(spr.recomb_node)?;
    Some(
        matched
            .into_iter()
            .enumerate()
            .map(|(node, other)| (node != broken || spr.is_invisible()).then_some(other))
            .collect(),
    )
}

/// Fails unless `spr` and `mapping` turn `prev` into `cur`.
pub fn check_link(
    prev: &LocalTree,
    spr: &Spr,
    mapping: &NodeMapping,
    cur: &LocalTree,
    ntimes: usize,
) -> Result<(), ArgError> {
    spr.check(prev, ntimes)?;
    match link_trees(prev, spr, cur, ntimes) {
        Some(expected) if &expected == mapping => Ok(()),
        Some(_) => Err(ArgError::Structure(
            ErrorInfo::new("link-mapping", "stored node mapping disagrees with the SPR")
                .with_context("recomb_node", spr.recomb_node.to_string())
                .with_context("coal_node", spr.coal_node.to_string()),
        )),
        None => Err(ArgError::Structure(
            ErrorInfo::new("link-spr", "SPR does not produce the next tree")
                .with_context("recomb_node", spr.recomb_node.to_string())
                .with_context("coal_node", spr.coal_node.to_string()),
        )),
    }
}

/// Finds a single SPR turning `prev` into `cur`, if one exists.
///
/// Candidates are tried in node order and the recombination is placed at the
/// bottom of the pruned branch. Identical trees yield `None`.
pub fn find_spr(prev: &LocalTree, cur: &LocalTree, ntimes: usize) -> Option<(Spr, NodeMapping)> {
    if prev.nnodes() != cur.nnodes() || same_tree(prev, cur) {
        return None;
    }
    let prev_sets = prev.leafsets();
    let cur_sets = cur.leafsets();
    let cur_index: HashMap<&LeafSet, usize> = cur_sets
        .iter()
        .enumerate()
        .map(|(node, set)| (set, node))
        .collect();

    for recomb_node in 0..prev.nnodes() {
        let Some(broken) = prev.parent(recomb_node) else {
            continue;
        };
        let recomb_time = prev.age(recomb_node);
        if recomb_time >= prev.age(broken) {
            continue;
        }
        let Some(&moved) = cur_index.get(&prev_sets[recomb_node]) else {
            continue;
        };
        let (Some(joined), Some(new_sibling)) = (cur.parent(moved), cur.sibling(moved)) else {
            continue;
        };
        let coal_time = cur.age(joined);
        let wanted = &cur_sets[new_sibling];
        let target = (0..prev.nnodes()).find(|&x| {
            x != broken
                && !prev.is_descendant(x, recomb_node)
                && &prev_sets[x].difference(&prev_sets[recomb_node]) == wanted
        });
        let Some(coal_node) = target else {
            continue;
        };
        let spr = Spr {
            recomb_node,
            recomb_time,
            coal_node,
            coal_time,
        };
        if spr.check(prev, ntimes).is_err() {
            continue;
        }
        if let Some(mapping) = link_trees(prev, &spr, cur, ntimes) {
            return Some((spr, mapping));
        }
    }
    None
}
