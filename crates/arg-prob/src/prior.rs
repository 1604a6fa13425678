//! Coalescent-with-recombination prior of a local-tree sequence.
//!
//! The transition at position `p` sits between `p - 1` and `p` and is scored
//! with the tree left of it. A window `[start, end)` owns the transitions
//! `start <= p < end` (the ARG start has none) plus the prior of the first
//! tree when it begins at the ARG start, so priors of adjacent windows add up
//! to the prior of their union.

use arg_core::Coord;
use arg_model::ArgModel;
use arg_tree::{LocalTree, LocalTrees, Spr};
use tracing::trace;

use crate::coal::{calc_log_spr_prob, calc_tree_prior, spr_lineages};
use crate::counts::CoalCounts;

/// Log probability of at least one recombination on a tree of total
/// length `treelen` across a transition with rate `rho`.
fn log_recomb(rho: f64, treelen: f64) -> f64 {
    (-(-rho * treelen).exp_m1()).ln()
}

fn log_event(
    model: &ArgModel,
    tree: &LocalTree,
    spr: &Spr,
    rho: f64,
    treelen: f64,
    counts: Option<&mut CoalCounts>,
) -> f64 {
    let lineages = spr_lineages(tree, spr, model.ntimes());
    log_recomb(rho, treelen) + calc_log_spr_prob(model, tree, spr, &lineages, treelen, counts)
}

/// Log prior of the window `[start, end)` of `trees`.
pub fn calc_arg_prior(model: &ArgModel, trees: &LocalTrees, start: Coord, end: Coord) -> f64 {
    calc_arg_prior_full(model, trees, start, end, None, &[])
}

/// Log prior of the window `[start, end)`, accumulating coalescence tallies
/// into `counts` and scoring the `invisible` recombinations, given as
/// `(transition, event)` pairs in the labels of the tree left of the
/// transition, in place of the no-recombination term.
pub fn calc_arg_prior_full(
    model: &ArgModel,
    trees: &LocalTrees,
    start: Coord,
    end: Coord,
    mut counts: Option<&mut CoalCounts>,
    invisible: &[(Coord, Spr)],
) -> f64 {
    let lo = start.max(trees.start());
    let hi = end.min(trees.end());
    if lo >= hi || trees.is_empty() {
        return 0.0;
    }
    let times = model.times();
    let blocks = trees.blocks();
    let mut lnp = 0.0;
    if lo == trees.start() {
        lnp += calc_tree_prior(model, &blocks[0].tree, counts.as_deref_mut());
    }

    let first = lo.max(trees.start() + 1);
    if first < hi {
        for idx in trees.blocks_overlapping(first - 1, hi - 1) {
            let block = &blocks[idx];
            let a = (block.start + 1).max(first);
            let b = (block.end + 1).min(hi);
            if a >= b {
                continue;
            }
            let treelen = block.tree.treelen(times);
            let inner_hi = b.min(block.end);
            if a < inner_hi {
                lnp -= treelen * model.recomb_sum(a, inner_hi);
            }
            if b > block.end {
                let next = &blocks[idx + 1];
                if let Some(spr) = &next.spr {
                    let rho = model.rho_at(block.end);
                    lnp += log_event(model, &block.tree, spr, rho, treelen, counts.as_deref_mut());
                }
            }
        }
    }

    for (pos, spr) in invisible {
        let pos = *pos;
        if pos < first || pos >= hi {
            continue;
        }
        let Some(idx) = trees.block_index(pos) else {
            continue;
        };
        if blocks[idx].start == pos {
            continue;
        }
        let tree = &blocks[idx].tree;
        let treelen = tree.treelen(times);
        let rho = model.rho_at(pos);
        lnp += rho * treelen;
        lnp += log_event(model, tree, spr, rho, treelen, counts.as_deref_mut());
    }
    trace!(start = lo, end = hi, lnp, "arg prior");
    lnp
}

/// Coalescence tallies of the whole ARG.
pub fn calc_arg_prior_counts(model: &ArgModel, trees: &LocalTrees) -> CoalCounts {
    let mut counts = CoalCounts::new(model.time().nsteps());
    calc_arg_prior_full(
        model,
        trees,
        trees.start(),
        trees.end(),
        Some(&mut counts),
        &[],
    );
    counts
}
