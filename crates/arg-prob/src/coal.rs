//! Discretized coalescent densities for single trees and single SPR events.
//!
//! A coalescence at time point `c` is attributed to the window of half-steps
//! `2c - 1` and `2c`, that is from the midpoint below `times[c]` to the
//! midpoint above it. For a lineage that starts at time point `k` the windows
//! of `c = k, k + 1, ...` partition the half-steps from `2k` onwards, and the
//! last window is unbounded, so the probabilities over `c` sum to one.

use arg_model::ArgModel;
use arg_tree::{LineageCounts, LocalTree, Spr};

use crate::counts::CoalCounts;

/// Half-step whose population size prices a coalescence at time point `c`.
fn coal_step(c: usize) -> usize {
    if c == 0 {
        0
    } else {
        2 * c - 1
    }
}

/// Log probability of a tree under the discretized coalescent.
///
/// Every pair of lineages coalesces at rate `1 / (2 N_h)` during half-step
/// `h`. Each internal node at time point `c` contributes the length of its
/// window times the pair rate of the half-step that opens the window.
pub fn calc_tree_prior(
    model: &ArgModel,
    tree: &LocalTree,
    mut counts: Option<&mut CoalCounts>,
) -> f64 {
    let steps = model.coal_time_steps();
    let lineages = LineageCounts::count(tree, model.ntimes());
    let mut lnp = 0.0;
    for (h, &branches) in lineages.nbranches.iter().enumerate() {
        if branches < 2 || !steps[h].is_finite() {
            continue;
        }
        let pairs = (branches * (branches - 1) / 2) as f64;
        lnp -= pairs * steps[h] / (2.0 * model.popsize(h));
        if let Some(counts) = counts.as_deref_mut() {
            counts.nocoal[h] += pairs;
        }
    }
    for node in 0..tree.nnodes() {
        if tree.is_leaf(node) {
            continue;
        }
        let c = tree.age(node);
        let h = coal_step(c);
        let mut window = 0.0;
        if c > 0 {
            window += steps[2 * c - 1];
        }
        if steps[2 * c].is_finite() {
            window += steps[2 * c];
        }
        lnp += window.ln() - (2.0 * model.popsize(h)).ln();
        if let Some(counts) = counts.as_deref_mut() {
            counts.coal[h] += 1.0;
        }
    }
    lnp
}

/// Log probability that a free lineage entering at time point `start_time`
/// first coalesces with one of the branches in `lineages` inside the window
/// of `coal_time`.
pub fn calc_log_coal_prob(
    model: &ArgModel,
    lineages: &LineageCounts,
    start_time: usize,
    coal_time: usize,
    counts: Option<&mut CoalCounts>,
) -> f64 {
    if coal_time < start_time || coal_time >= model.ntimes() {
        return f64::NEG_INFINITY;
    }
    let steps = model.coal_time_steps();
    let nsteps = steps.len();
    let first = 2 * start_time;
    let window_lo = if coal_time == start_time {
        first
    } else {
        2 * coal_time - 1
    };
    let window_hi = (2 * coal_time + 1).min(nsteps);
    let rate = |h: usize| match lineages.nbranches[h] {
        0 => 0.0,
        b => b as f64 * steps[h] / (2.0 * model.popsize(h)),
    };
    let survive: f64 = (first..window_lo).map(rate).sum();
    let inside: f64 = (window_lo..window_hi).map(rate).sum();

    if let Some(counts) = counts {
        for h in first..window_lo {
            counts.nocoal[h] += lineages.nbranches[h] as f64;
        }
        counts.coal[window_lo] += 1.0;
    }
    -survive + (-(-inside).exp_m1()).ln()
}

/// Branch counts a re-coalescing lineage sees for `spr`: the broken tree for
/// a visible event, the whole tree for an invisible one.
pub fn spr_lineages(tree: &LocalTree, spr: &Spr, ntimes: usize) -> LineageCounts {
    if spr.is_invisible() {
        LineageCounts::count(tree, ntimes)
    } else {
        LineageCounts::count_broken(tree, spr.recomb_node, ntimes)
    }
}

/// Log probability of one SPR event on `tree`.
///
/// The product of the recombination location (`interval / treelen`), the
/// re-coalescence time of the pruned lineage against `lineages` (see
/// [`spr_lineages`]), and a uniform choice among the branches available at
/// the coalescence time.
pub fn calc_log_spr_prob(
    model: &ArgModel,
    tree: &LocalTree,
    spr: &Spr,
    lineages: &LineageCounts,
    treelen: f64,
    counts: Option<&mut CoalCounts>,
) -> f64 {
    let ntimes = model.ntimes();
    if !(treelen > 0.0)
        || spr.recomb_node >= tree.nnodes()
        || spr.recomb_time >= ntimes
        || spr.coal_time >= ntimes
    {
        return f64::NEG_INFINITY;
    }
    let location = model.time().interval(spr.recomb_time) / treelen;
    let branches = lineages.ncoals[spr.coal_time];
    if branches == 0 || location <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let coal = calc_log_coal_prob(model, lineages, spr.recomb_time, spr.coal_time, counts);
    location.ln() + coal - (branches as f64).ln()
}
