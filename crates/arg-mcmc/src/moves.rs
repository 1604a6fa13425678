//! Proposals on the local-tree sequence.
//!
//! A proposal names a run of blocks and the segments that replace them. It
//! never mutates the sequence itself; the kernel splices it in, scores the
//! affected window and undoes the splice on rejection.

use arg_core::{Coord, Region, RngHandle};
use arg_tree::spr::broken_parent;
use arg_tree::{LeafSet, LocalTree, LocalTrees, TreeSegment};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use crate::config::SamplerConfig;

/// Kind of move proposed by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Prune a clade and regraft it over a genomic segment.
    Regraft,
    /// Move a breakpoint between its neighbouring breakpoints.
    Shift,
    /// Remove a breakpoint by extending one neighbouring tree over the other.
    Merge,
}

impl MoveKind {
    /// Label used in acceptance summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::Regraft => "regraft",
            MoveKind::Shift => "shift",
            MoveKind::Merge => "merge",
        }
    }
}

/// Proposal tuning shared by every move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveSettings {
    /// Probability of pruning the clade that recombines at the nearest
    /// breakpoint.
    pub prob_path_switch: f64,
    /// Mean extension of a regraft on each side of its anchor position.
    pub mean_segment_length: f64,
    /// Probability of a shift move during resampling.
    pub shift_fraction: f64,
    /// Preference for removing recombinations while climbing.
    pub recomb_preference: f64,
    /// Candidates drawn per climb step.
    pub climb_candidates: usize,
    /// Number of time points.
    pub ntimes: usize,
}

impl MoveSettings {
    /// Settings taken from a sampler configuration.
    pub fn from_config(config: &SamplerConfig, ntimes: usize) -> Self {
        Self {
            prob_path_switch: config.search.prob_path_switch,
            mean_segment_length: config.moves.mean_segment_length,
            shift_fraction: config.moves.shift_fraction,
            recomb_preference: config.moves.recomb_preference,
            climb_candidates: config.moves.climb_candidates,
            ntimes,
        }
    }
}

/// A candidate replacement of blocks `first..=last`.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// Move that produced the candidate.
    pub kind: MoveKind,
    /// First replaced block.
    pub first: usize,
    /// Last replaced block.
    pub last: usize,
    /// Segments covering exactly the replaced blocks.
    pub segments: Vec<TreeSegment>,
    /// Coordinates whose tree may change.
    pub window: Region,
    forward: Option<PruneChoice>,
}

/// Anchor of a regraft, kept to price the reverse move.
#[derive(Debug, Clone, PartialEq)]
struct PruneChoice {
    pos: Coord,
    clade: LeafSet,
    log_q: f64,
}

impl Proposal {
    /// Log ratio of reverse to forward proposal probability, evaluated on the
    /// sequence after the proposal was spliced in.
    ///
    /// Only the choice of the pruned clade is asymmetric: the regraft target
    /// and time are drawn uniformly from a broken tree that is the same in
    /// both directions, and the segment extension is treated as symmetric.
    pub fn log_hastings(&self, trees: &LocalTrees, prob_path_switch: f64) -> f64 {
        let Some(choice) = &self.forward else {
            return 0.0;
        };
        let Some(idx) = trees.block_index(choice.pos) else {
            return f64::NEG_INFINITY;
        };
        let tree = &trees.blocks()[idx].tree;
        let Some(node) = tree.leafsets().iter().position(|set| *set == choice.clade) else {
            return f64::NEG_INFINITY;
        };
        let switch = path_switch_node(trees, idx, choice.pos);
        log_prune_prob(tree, switch, node, prob_path_switch) - choice.log_q
    }

    /// Window scored before and after the splice: the changed coordinates
    /// plus the transition right of them.
    pub fn score_window(&self, trees: &LocalTrees) -> (Coord, Coord) {
        (self.window.start, (self.window.end + 1).min(trees.end()))
    }
}

/// Recombining branch of the breakpoint nearest to `pos`, in the labels of
/// block `idx`.
fn path_switch_node(trees: &LocalTrees, idx: usize, pos: Coord) -> Option<usize> {
    let blocks = trees.blocks();
    let block = &blocks[idx];
    let left = match (&block.spr, &block.mapping) {
        (Some(spr), Some(mapping)) => mapping.get(spr.recomb_node).copied().flatten(),
        _ => None,
    };
    let right = blocks
        .get(idx + 1)
        .and_then(|next| next.spr.as_ref())
        .map(|spr| spr.recomb_node);
    match (left, right) {
        (Some(l), Some(r)) => {
            if pos - block.start < block.end - pos {
                Some(l)
            } else {
                Some(r)
            }
        }
        (l, r) => l.or(r),
    }
}

fn log_prune_prob(tree: &LocalTree, switch: Option<usize>, node: usize, pps: f64) -> f64 {
    let uniform = 1.0 / (tree.nnodes() - 1) as f64;
    match switch {
        Some(s) if s == node => ((1.0 - pps) * uniform + pps).ln(),
        Some(_) => ((1.0 - pps) * uniform).ln(),
        None => uniform.ln(),
    }
}

fn choose_pruned(
    tree: &LocalTree,
    switch: Option<usize>,
    pps: f64,
    rng: &mut RngHandle,
) -> usize {
    if let Some(node) = switch {
        if rng.uniform() < pps {
            return node;
        }
    }
    let k = rng.gen_range(0..tree.nnodes() - 1);
    if k < tree.root() {
        k
    } else {
        k + 1
    }
}

/// Regrafts the clade `clade` of `tree` onto the branch whose broken-tree
/// clade is `target_set`, at time index `time`.
fn regraft_clade(
    tree: &LocalTree,
    clade: &LeafSet,
    target_set: &LeafSet,
    time: usize,
) -> Option<LocalTree> {
    let sets = tree.leafsets();
    let node = sets.iter().position(|set| set == clade)?;
    let parent = tree.parent(node)?;
    let target = (0..tree.nnodes()).find(|&y| {
        y != parent && !tree.is_descendant(y, node) && &sets[y].difference(clade) == target_set
    })?;
    tree.regraft(node, target, time).ok()
}

/// Midpoint cut keeping at least one coordinate on each side when possible.
fn midpoint(lo: Coord, hi: Coord) -> Coord {
    if hi - lo >= 2 {
        lo + (hi - lo) / 2
    } else {
        hi
    }
}

/// Prunes a clade at a random position of `region` and regrafts it onto a
/// random branch and time of the broken tree, over a random segment around
/// that position.
///
/// The segment stops before the first tree in which the same clade move is
/// impossible. Returns `None` when the tree at the anchor has nothing to
/// prune or the draw reproduces the current tree.
pub fn propose_regraft(
    trees: &LocalTrees,
    region: Region,
    settings: &MoveSettings,
    rng: &mut RngHandle,
) -> Option<Proposal> {
    if region.is_empty() {
        return None;
    }
    let pos = rng.gen_range(region.start..region.end);
    let idx = trees.block_index(pos)?;
    let blocks = trees.blocks();
    let tree = &blocks[idx].tree;
    if tree.nnodes() < 3 {
        return None;
    }
    let pps = settings.prob_path_switch;
    let switch = path_switch_node(trees, idx, pos);
    let node = choose_pruned(tree, switch, pps, rng);
    let log_q = log_prune_prob(tree, switch, node, pps);
    let broken = tree.parent(node)?;
    let sibling = tree.sibling(node)?;

    let min_time = tree.age(node).max(1);
    let mut branches: Vec<(usize, usize, usize)> = Vec::new();
    for x in 0..tree.nnodes() {
        if x == broken || tree.is_descendant(x, node) {
            continue;
        }
        let lo = tree.age(x).max(min_time);
        let hi = broken_parent(tree, node, x).map_or(settings.ntimes - 1, |p| tree.age(p));
        if lo <= hi {
            branches.push((x, lo, hi));
        }
    }
    let total: usize = branches.iter().map(|&(_, lo, hi)| hi - lo + 1).sum();
    if total == 0 {
        return None;
    }
    let mut draw = rng.gen_range(0..total);
    let mut target = None;
    for &(x, lo, hi) in &branches {
        let width = hi - lo + 1;
        if draw < width {
            target = Some((x, lo + draw));
            break;
        }
        draw -= width;
    }
    let (x, time) = target?;
    if x == sibling && time == tree.age(broken) {
        return None;
    }

    let sets = tree.leafsets();
    let clade = sets[node].clone();
    let target_set = sets[x].difference(&clade);
    let center = regraft_clade(tree, &clade, &target_set, time)?;

    let extension = Exp::new(1.0 / settings.mean_segment_length).ok()?;
    let left = extension.sample(rng) as usize;
    let right = extension.sample(rng) as usize;
    let mut lo = pos.saturating_sub(left).max(region.start);
    let mut hi = pos.saturating_add(1).saturating_add(right).min(region.end);

    let mut right_trees = Vec::new();
    let mut last = idx;
    for j in idx + 1..blocks.len() {
        if blocks[j].start >= hi {
            break;
        }
        match regraft_clade(&blocks[j].tree, &clade, &target_set, time) {
            Some(new_tree) => {
                right_trees.push(new_tree);
                last = j;
            }
            None => {
                let prev = &blocks[j - 1];
                hi = midpoint(prev.start.max(lo), prev.end).max(pos + 1);
                break;
            }
        }
    }
    let mut left_trees = Vec::new();
    let mut first = idx;
    for j in (0..idx).rev() {
        if blocks[j].end <= lo {
            break;
        }
        match regraft_clade(&blocks[j].tree, &clade, &target_set, time) {
            Some(new_tree) => {
                left_trees.push(new_tree);
                first = j;
            }
            None => {
                let next = &blocks[j + 1];
                let end = next.end.min(hi);
                lo = (end - midpoint(0, end - next.start)).min(pos);
                break;
            }
        }
    }

    let new_trees = left_trees
        .into_iter()
        .rev()
        .chain(std::iter::once(center))
        .chain(right_trees);
    let mut segments = Vec::with_capacity(last - first + 3);
    for (block, new_tree) in blocks[first..=last].iter().zip(new_trees) {
        let a = block.start.max(lo);
        let b = block.end.min(hi);
        if block.start < a {
            segments.push(TreeSegment {
                start: block.start,
                end: a,
                tree: block.tree.clone(),
            });
        }
        segments.push(TreeSegment {
            start: a,
            end: b,
            tree: new_tree,
        });
        if b < block.end {
            segments.push(TreeSegment {
                start: b,
                end: block.end,
                tree: block.tree.clone(),
            });
        }
    }
    Some(Proposal {
        kind: MoveKind::Regraft,
        first,
        last,
        segments,
        window: Region { start: lo, end: hi },
        forward: Some(PruneChoice { pos, clade, log_q }),
    })
}

/// Breakpoints whose position lies in `[region.start, region.end]`.
fn movable_breakpoints(trees: &LocalTrees, region: Region) -> Vec<usize> {
    trees
        .blocks()
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, block)| region.start <= block.start && block.start <= region.end)
        .map(|(idx, _)| idx)
        .collect()
}

/// Moves a breakpoint uniformly between the starts of its neighbouring
/// blocks, staying inside `region`. Symmetric.
pub fn propose_shift(trees: &LocalTrees, region: Region, rng: &mut RngHandle) -> Option<Proposal> {
    let eligible = movable_breakpoints(trees, region);
    if eligible.is_empty() {
        return None;
    }
    let idx = eligible[rng.gen_range(0..eligible.len())];
    let blocks = trees.blocks();
    let (prev, cur) = (&blocks[idx - 1], &blocks[idx]);
    let lo = (prev.start + 1).max(region.start);
    let hi = (cur.end - 1).min(region.end);
    if lo > hi {
        return None;
    }
    let pos = rng.gen_range(lo..=hi);
    if pos == cur.start {
        return None;
    }
    Some(Proposal {
        kind: MoveKind::Shift,
        first: idx - 1,
        last: idx,
        segments: vec![
            TreeSegment {
                start: prev.start,
                end: pos,
                tree: prev.tree.clone(),
            },
            TreeSegment {
                start: pos,
                end: cur.end,
                tree: cur.tree.clone(),
            },
        ],
        window: Region {
            start: pos.min(cur.start),
            end: pos.max(cur.start),
        },
        forward: None,
    })
}

/// Removes a breakpoint by extending the tree on one side over the block on
/// the other side. Only the coordinates inside `region` may change.
pub fn propose_merge(trees: &LocalTrees, region: Region, rng: &mut RngHandle) -> Option<Proposal> {
    let eligible = movable_breakpoints(trees, region);
    if eligible.is_empty() {
        return None;
    }
    let idx = eligible[rng.gen_range(0..eligible.len())];
    let blocks = trees.blocks();
    let (prev, cur) = (&blocks[idx - 1], &blocks[idx]);
    let extend_prev = cur.end <= region.end;
    let extend_cur = prev.start >= region.start;
    let keep_prev = match (extend_prev, extend_cur) {
        (true, true) => rng.gen_bool(0.5),
        (true, false) => true,
        (false, true) => false,
        (false, false) => return None,
    };
    let (tree, window) = if keep_prev {
        (prev.tree.clone(), Region { start: cur.start, end: cur.end })
    } else {
        (cur.tree.clone(), Region { start: prev.start, end: cur.start })
    };
    Some(Proposal {
        kind: MoveKind::Merge,
        first: idx - 1,
        last: idx,
        segments: vec![TreeSegment {
            start: prev.start,
            end: cur.end,
            tree,
        }],
        window,
        forward: None,
    })
}
