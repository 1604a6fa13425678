//! Binary local trees stored as index arenas.
//!
//! Leaves occupy indices `0..nleaves`; internal nodes follow. Node ages are
//! time-grid indices.

use std::collections::BTreeMap;

use arg_core::{ArgError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::leafset::LeafSet;

/// One node of a [`LocalTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNode {
    /// Parent index, `None` for the root.
    pub parent: Option<usize>,
    /// Child indices, `None` for leaves.
    pub children: Option<[usize; 2]>,
    /// Time index of the node.
    pub age: usize,
}

/// Rooted binary genealogy of the sampled haplotypes at one genomic position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTree {
    nodes: Vec<LocalNode>,
    root: usize,
    nleaves: usize,
}

fn structure(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
}

impl LocalTree {
    /// Tree holding a single sampled haplotype.
    pub fn single_leaf() -> Self {
        Self {
            nodes: vec![LocalNode {
                parent: None,
                children: None,
                age: 0,
            }],
            root: 0,
            nleaves: 1,
        }
    }

    /// Builds a tree from parent links and ages, checking its shape.
    pub fn from_parents(parents: &[Option<usize>], ages: &[usize]) -> Result<Self, ArgError> {
        let nnodes = parents.len();
        if nnodes == 0 || nnodes % 2 == 0 || ages.len() != nnodes {
            return Err(ArgError::Structure(
                structure("tree-size", "a binary tree needs 2n-1 nodes with one age each")
                    .with_context("nodes", nnodes.to_string())
                    .with_context("ages", ages.len().to_string()),
            ));
        }
        let nleaves = (nnodes + 1) / 2;
        let mut kids: Vec<Vec<usize>> = vec![Vec::new(); nnodes];
        let mut root = None;
        for (node, &parent) in parents.iter().enumerate() {
            match parent {
                Some(p) if p < nnodes && p != node => kids[p].push(node),
                Some(p) => {
                    return Err(ArgError::Structure(
                        structure("tree-parent", "parent index out of range")
                            .with_context("node", node.to_string())
                            .with_context("parent", p.to_string()),
                    ))
                }
                None => {
                    if let Some(previous) = root.replace(node) {
                        return Err(ArgError::Structure(
                            structure("tree-roots", "tree has more than one root")
                                .with_context("first", previous.to_string())
                                .with_context("second", node.to_string()),
                        ));
                    }
                }
            }
        }
        let root =
            root.ok_or_else(|| ArgError::Structure(structure("tree-roots", "tree has no root")))?;
        let mut nodes: Vec<LocalNode> = parents
            .iter()
            .zip(ages)
            .map(|(&parent, &age)| LocalNode {
                parent,
                children: None,
                age,
            })
            .collect();
        for (node, children) in kids.into_iter().enumerate() {
            match children.as_slice() {
                [] => {}
                [a, b] => nodes[node].children = Some([*a, *b]),
                _ => {
                    return Err(ArgError::Structure(
                        structure("tree-not-binary", "internal node must have two children")
                            .with_context("node", node.to_string())
                            .with_context("children", children.len().to_string()),
                    ))
                }
            }
        }
        let tree = Self {
            nodes,
            root,
            nleaves,
        };
        tree.check_shape()?;
        Ok(tree)
    }

    /// Number of leaves.
    pub fn nleaves(&self) -> usize {
        self.nleaves
    }

    /// Number of nodes (`2 * nleaves - 1`).
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    /// Root index.
    pub fn root(&self) -> usize {
        self.root
    }

    /// All nodes, indexed by label.
    pub fn nodes(&self) -> &[LocalNode] {
        &self.nodes
    }

    /// Node `node`.
    pub fn node(&self, node: usize) -> &LocalNode {
        &self.nodes[node]
    }

    /// Parent of `node`.
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    /// Children of `node`.
    pub fn children(&self, node: usize) -> Option<[usize; 2]> {
        self.nodes[node].children
    }

    /// Time index of `node`.
    pub fn age(&self, node: usize) -> usize {
        self.nodes[node].age
    }

    /// Whether `node` is a leaf.
    pub fn is_leaf(&self, node: usize) -> bool {
        self.nodes[node].children.is_none()
    }

    /// The other child of `node`'s parent.
    pub fn sibling(&self, node: usize) -> Option<usize> {
        let parent = self.nodes[node].parent?;
        let [a, b] = self.nodes[parent].children?;
        Some(if a == node { b } else { a })
    }

    /// Whether `node` lies in the subtree rooted at `ancestor` (inclusive).
    pub fn is_descendant(&self, node: usize, ancestor: usize) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes[current].parent;
        }
        false
    }

    /// Nodes of the subtree rooted at `node`, parents before children.
    pub fn preorder_from(&self, node: usize) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            order.push(current);
            if let Some([a, b]) = self.nodes[current].children {
                stack.push(b);
                stack.push(a);
            }
        }
        order
    }

    /// All nodes, parents before children.
    pub fn preorder(&self) -> Vec<usize> {
        self.preorder_from(self.root)
    }

    /// All nodes, children before parents.
    pub fn postorder(&self) -> Vec<usize> {
        let mut order = self.preorder();
        order.reverse();
        order
    }

    /// Leaf set below every node, indexed by node.
    pub fn leafsets(&self) -> Vec<LeafSet> {
        let mut sets = vec![LeafSet::empty(self.nleaves); self.nodes.len()];
        for node in self.postorder() {
            match self.nodes[node].children {
                None => sets[node].insert(node),
                Some([a, b]) => {
                    let mut set = sets[a].clone();
                    set.union_with(&sets[b]);
                    sets[node] = set;
                }
            }
        }
        sets
    }

    /// Clade of every node mapped to its age; equal maps mean equal trees up
    /// to internal node labels.
    pub fn clade_ages(&self) -> BTreeMap<LeafSet, usize> {
        self.leafsets()
            .into_iter()
            .enumerate()
            .map(|(node, set)| (set, self.nodes[node].age))
            .collect()
    }

    /// Length of the branch above `node` in generations (zero for the root).
    pub fn branch_length(&self, node: usize, times: &[f64]) -> f64 {
        match self.nodes[node].parent {
            Some(p) => times[self.nodes[p].age] - times[self.nodes[node].age],
            None => 0.0,
        }
    }

    /// Total branch length excluding the root.
    pub fn treelen(&self, times: &[f64]) -> f64 {
        (0..self.nodes.len())
            .map(|node| self.branch_length(node, times))
            .sum()
    }

    /// Checks every structural invariant, including ages below `ntimes`.
    pub fn check(&self, ntimes: usize) -> Result<(), ArgError> {
        self.check_shape()?;
        if let Some(node) = self.nodes.iter().position(|n| n.age >= ntimes) {
            return Err(ArgError::Structure(
                structure("tree-age-range", "node age outside the time grid")
                    .with_context("node", node.to_string())
                    .with_context("age", self.nodes[node].age.to_string()),
            ));
        }
        Ok(())
    }

    fn check_shape(&self) -> Result<(), ArgError> {
        let nnodes = self.nodes.len();
        if nnodes != 2 * self.nleaves - 1 {
            return Err(ArgError::Structure(
                structure("tree-size", "node count does not match leaf count")
                    .with_context("nodes", nnodes.to_string())
                    .with_context("leaves", self.nleaves.to_string()),
            ));
        }
        if self.root >= nnodes || self.nodes[self.root].parent.is_some() {
            return Err(ArgError::Structure(
                structure("tree-root", "root index does not name a parentless node")
                    .with_context("root", self.root.to_string()),
            ));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            let should_be_leaf = idx < self.nleaves;
            match node.children {
                None if should_be_leaf => {}
                Some([a, b]) if !should_be_leaf => {
                    for child in [a, b] {
                        if child >= nnodes || self.nodes[child].parent != Some(idx) || a == b {
                            return Err(ArgError::Structure(
                                structure("tree-links", "child and parent links disagree")
                                    .with_context("node", idx.to_string())
                                    .with_context("child", child.to_string()),
                            ));
                        }
                        if self.nodes[child].age > node.age {
                            return Err(ArgError::Structure(
                                structure("tree-age-order", "child is older than its parent")
                                    .with_context("node", idx.to_string())
                                    .with_context("child", child.to_string()),
                            ));
                        }
                    }
                }
                _ => {
                    return Err(ArgError::Structure(
                        structure("tree-leaf-layout", "leaves must occupy the first indices")
                            .with_context("node", idx.to_string()),
                    ))
                }
            }
            if let Some(p) = node.parent {
                let linked = p < nnodes
                    && self.nodes[p]
                        .children
                        .is_some_and(|children| children.contains(&idx));
                if !linked {
                    return Err(ArgError::Structure(
                        structure("tree-links", "parent does not list node as a child")
                            .with_context("node", idx.to_string())
                            .with_context("parent", p.to_string()),
                    ));
                }
            }
        }
        let reachable = self.preorder().len();
        if reachable != nnodes {
            return Err(ArgError::Structure(
                structure("tree-unreachable", "some nodes are not reachable from the root")
                    .with_context("reachable", reachable.to_string())
                    .with_context("nodes", nnodes.to_string()),
            ));
        }
        Ok(())
    }

    /// Prunes the subtree at `node` and regrafts it onto the branch above
    /// `target` at time index `time`.
    ///
    /// The pruned node's old parent is reused as the new coalescence node, so
    /// every other label is preserved. Targeting the old parent means
    /// targeting the sibling.
    pub fn regraft(&self, node: usize, target: usize, time: usize) -> Result<LocalTree, ArgError> {
        let nnodes = self.nodes.len();
        if node >= nnodes || target >= nnodes {
            return Err(ArgError::Structure(
                structure("regraft-range", "regraft node out of range")
                    .with_context("node", node.to_string())
                    .with_context("target", target.to_string()),
            ));
        }
        let (Some(parent), Some(sibling)) = (self.parent(node), self.sibling(node)) else {
            return Err(ArgError::Structure(
                structure("regraft-root", "the root cannot be pruned")
                    .with_context("node", node.to_string()),
            ));
        };
        if self.is_descendant(target, node) {
            return Err(ArgError::Structure(
                structure("regraft-target", "target lies inside the pruned subtree")
                    .with_context("node", node.to_string())
                    .with_context("target", target.to_string()),
            ));
        }
        let target = if target == parent { sibling } else { target };
        let target_parent = if target == sibling {
            self.parent(parent)
        } else {
            self.parent(target)
        };
        let fits = time >= self.age(node)
            && time >= self.age(target)
            && target_parent.map_or(true, |p| time <= self.age(p));
        if !fits {
            return Err(ArgError::Structure(
                structure("regraft-time", "regraft time outside the target branch")
                    .with_context("target", target.to_string())
                    .with_context("time", time.to_string()),
            ));
        }

        let mut tree = self.clone();
        let grandparent = tree.nodes[parent].parent;
        tree.nodes[sibling].parent = grandparent;
        match grandparent {
            Some(gp) => tree.replace_child(gp, parent, sibling),
            None => tree.root = sibling,
        }

        let above = tree.nodes[target].parent;
        tree.nodes[parent].children = Some(ordered(node, target));
        tree.nodes[parent].parent = above;
        tree.nodes[parent].age = time;
        tree.nodes[target].parent = Some(parent);
        match above {
            Some(p) => tree.replace_child(p, target, parent),
            None => tree.root = parent,
        }
        Ok(tree)
    }

    /// Adds a new leaf (index `nleaves`) joined to the branch above `target`
    /// at time index `time`. Internal labels shift up by one; the new
    /// coalescence node takes the last index.
    pub fn with_new_leaf(&self, target: usize, time: usize) -> Result<LocalTree, ArgError> {
        let n = self.nleaves;
        let old = self.nodes.len();
        if target >= old {
            return Err(ArgError::Structure(
                structure("new-leaf-target", "target out of range")
                    .with_context("target", target.to_string()),
            ));
        }
        let relabel = |v: usize| if v < n { v } else { v + 1 };
        let mut parents = vec![None; old + 2];
        let mut ages = vec![0; old + 2];
        for (v, node) in self.nodes.iter().enumerate() {
            parents[relabel(v)] = node.parent.map(relabel);
            ages[relabel(v)] = node.age;
        }
        let joined = old + 1;
        let moved = relabel(target);
        let above = parents[moved];
        let fits = time >= self.age(target) && above.map_or(true, |p| time <= ages[p]);
        if !fits {
            return Err(ArgError::Structure(
                structure("new-leaf-time", "join time outside the target branch")
                    .with_context("target", target.to_string())
                    .with_context("time", time.to_string()),
            ));
        }
        parents[joined] = above;
        ages[joined] = time;
        parents[moved] = Some(joined);
        parents[n] = Some(joined);
        Self::from_parents(&parents, &ages)
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let Some([a, b]) = self.nodes[parent].children {
            let kept = if a == old { b } else { a };
            self.nodes[parent].children = Some(ordered(kept, new));
        }
    }
}

/// Children are stored in increasing label order.
fn ordered(a: usize, b: usize) -> [usize; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}
