//! Jukes-Cantor mutation likelihood by Felsenstein pruning.
//!
//! Sites are evaluated block by block. Within a block every distinct
//! leaf pattern (and mutation rate) is pruned once, and the per-site values
//! are summed in site order so repeated evaluations agree bit for bit.

use std::collections::HashMap;

use arg_core::Coord;
use arg_model::ArgModel;
use arg_tree::{LocalTree, LocalTrees, Sequences, SitesMapping};
use tracing::trace;

/// Partial likelihoods of the four bases below one node.
type Partials = [f64; 4];

fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Probability of keeping a base and of turning into one specific other
/// base along every branch of `tree`.
fn branch_probs(tree: &LocalTree, times: &[f64], mu: f64) -> Vec<(f64, f64)> {
    (0..tree.nnodes())
        .map(|node| {
            let decay = (-4.0 / 3.0 * mu * tree.branch_length(node, times)).exp();
            (0.25 + 0.75 * decay, 0.25 - 0.25 * decay)
        })
        .collect()
}

fn along_branch(child: &Partials, (same, diff): (f64, f64), base: usize) -> f64 {
    let total: f64 = child.iter().sum();
    same * child[base] + diff * (total - child[base])
}

/// Log likelihood of one column, given as one base per leaf. Missing bases
/// leave every state possible.
fn site_likelihood(
    tree: &LocalTree,
    order: &[usize],
    probs: &[(f64, f64)],
    column: &[u8],
    table: &mut [Partials],
) -> f64 {
    let mut log_scale = 0.0;
    for &node in order {
        match tree.children(node) {
            None => {
                table[node] = match base_index(column[node]) {
                    Some(i) => {
                        let mut leaf = [0.0; 4];
                        leaf[i] = 1.0;
                        leaf
                    }
                    None => [1.0; 4],
                };
            }
            Some([a, b]) => {
                let mut partials = [0.0; 4];
                for (base, value) in partials.iter_mut().enumerate() {
                    *value = along_branch(&table[a], probs[a], base)
                        * along_branch(&table[b], probs[b], base);
                }
                let scale = partials.iter().copied().fold(0.0, f64::max);
                if !(scale > 0.0) {
                    return f64::NEG_INFINITY;
                }
                partials.iter_mut().for_each(|p| *p /= scale);
                log_scale += scale.ln();
                table[node] = partials;
            }
        }
    }
    let root: f64 = table[tree.root()].iter().sum();
    log_scale + (0.25 * root).ln()
}

/// Pruning state shared by the sites of one block.
struct BlockEvaluator<'a> {
    tree: &'a LocalTree,
    times: &'a [f64],
    order: Vec<usize>,
    table: Vec<Partials>,
    probs: HashMap<u64, Vec<(f64, f64)>>,
    patterns: HashMap<(Vec<u8>, u64), f64>,
}

impl<'a> BlockEvaluator<'a> {
    fn new(tree: &'a LocalTree, times: &'a [f64]) -> Self {
        Self {
            tree,
            times,
            order: tree.postorder(),
            table: vec![[0.0; 4]; tree.nnodes()],
            probs: HashMap::new(),
            patterns: HashMap::new(),
        }
    }

    fn site(&mut self, column: Vec<u8>, mu: f64) -> f64 {
        let key = (column, mu.to_bits());
        if let Some(&cached) = self.patterns.get(&key) {
            return cached;
        }
        let (tree, times) = (self.tree, self.times);
        let probs = self
            .probs
            .entry(key.1)
            .or_insert_with(|| branch_probs(tree, times, mu));
        let value = site_likelihood(tree, &self.order, probs, &key.0, &mut self.table);
        self.patterns.insert(key, value);
        value
    }
}

fn column(seqs: &Sequences, seqids: &[usize], pos: Coord) -> Vec<u8> {
    seqids.iter().map(|&seq| seqs.base(seq, pos)).collect()
}

/// Log likelihood of the sequences over `[start, end)` given the trees.
///
/// `seqs` and `trees` share one coordinate system; positions outside the
/// alignment contribute nothing.
pub fn calc_arg_likelihood(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    start: Coord,
    end: Coord,
) -> f64 {
    let lo = start.max(trees.start()).max(seqs.offset());
    let hi = end.min(trees.end()).min(seqs.end());
    if lo >= hi {
        return 0.0;
    }
    let times = model.times();
    let mut lnl = 0.0;
    for block in &trees.blocks()[trees.blocks_overlapping(lo, hi)] {
        let mut eval = BlockEvaluator::new(&block.tree, times);
        for pos in block.start.max(lo)..block.end.min(hi) {
            lnl += eval.site(column(seqs, trees.seqids(), pos), model.mu_at(pos));
        }
    }
    trace!(start = lo, end = hi, lnl, "arg likelihood");
    lnl
}

/// Log likelihood of the sequences `seqids` under one `tree`, summed over
/// each span `[start, end)` separately. `seqids[i]` is the sequence of
/// leaf `i`.
pub fn calc_tree_likelihood_spans(
    model: &ArgModel,
    seqs: &Sequences,
    tree: &LocalTree,
    seqids: &[usize],
    spans: &[(Coord, Coord)],
) -> Vec<f64> {
    let mut eval = BlockEvaluator::new(tree, model.times());
    spans
        .iter()
        .map(|&(start, end)| {
            (start.max(seqs.offset())..end.min(seqs.end()))
                .map(|pos| eval.site(column(seqs, seqids, pos), model.mu_at(pos)))
                .sum()
        })
        .collect()
}

/// Log likelihood with `trees` in original coordinates and `seqs` (and the
/// model's rates) in the compressed coordinates of `mapping`. The window
/// `[start, end)` is given in original coordinates.
pub fn calc_arg_likelihood_mapped(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    mapping: &SitesMapping,
    start: Coord,
    end: Coord,
) -> f64 {
    let lo = start.max(trees.start());
    let hi = end.min(trees.end());
    if lo >= hi {
        return 0.0;
    }
    let times = model.times();
    let mut lnl = 0.0;
    for block in &trees.blocks()[trees.blocks_overlapping(lo, hi)] {
        let a = mapping.compress(block.start.max(lo)).max(seqs.offset());
        let b = mapping.compress(block.end.min(hi)).min(seqs.end());
        if a >= b {
            continue;
        }
        let mut eval = BlockEvaluator::new(&block.tree, times);
        for pos in a..b {
            lnl += eval.site(column(seqs, trees.seqids(), pos), model.mu_at(pos));
        }
    }
    lnl
}
