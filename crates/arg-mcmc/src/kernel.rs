use std::collections::BTreeMap;

use arg_core::{invariant_violation, sample_log_weights, ArgError, Region, RngHandle};
use arg_model::ArgModel;
use arg_prob::score_window;
use arg_tree::{LocalTrees, Sequences, SpliceUndo};
use indexmap::IndexMap;
use tracing::trace;

use crate::moves::{self, MoveKind, MoveSettings, Proposal};

/// Proposed and accepted counts per move kind, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveTallies {
    counts: IndexMap<MoveKind, (usize, usize)>,
}

impl MoveTallies {
    /// Creates empty tallies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one attempt.
    pub fn record(&mut self, kind: MoveKind, accepted: bool) {
        let entry = self.counts.entry(kind).or_insert((0, 0));
        entry.0 += 1;
        if accepted {
            entry.1 += 1;
        }
    }

    /// Attempts of `kind`.
    pub fn proposed(&self, kind: MoveKind) -> usize {
        self.counts.get(&kind).map_or(0, |c| c.0)
    }

    /// Acceptances of `kind`.
    pub fn accepted(&self, kind: MoveKind) -> usize {
        self.counts.get(&kind).map_or(0, |c| c.1)
    }

    /// Acceptance rate per move label.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        self.counts
            .iter()
            .map(|(kind, &(proposed, accepted))| {
                let rate = if proposed == 0 {
                    0.0
                } else {
                    accepted as f64 / proposed as f64
                };
                (kind.as_str().to_string(), rate)
            })
            .collect()
    }
}

/// Read-only inputs of a move.
#[derive(Debug, Clone, Copy)]
pub struct MoveContext<'a> {
    /// Demography and rates.
    pub model: &'a ArgModel,
    /// Alignment in the coordinates of the trees.
    pub seqs: &'a Sequences,
    /// Proposal tuning.
    pub settings: &'a MoveSettings,
    /// Inverse temperature of the joint probability.
    pub heat: f64,
    /// Validates the sequence after every accepted move.
    pub check_invariants: bool,
}

impl MoveContext<'_> {
    fn joint(&self, trees: &LocalTrees, (lo, hi): (usize, usize)) -> f64 {
        score_window(self.model, self.seqs, trees, lo, hi).joint
    }

    /// Splices `proposal` into `trees` and returns the undo record with the
    /// change in log joint probability it causes.
    ///
    /// The proposal window is scored first. When the splice rewrites links
    /// beyond it, the splice is undone, the widened window scored and the
    /// splice replayed. `Ok(None)` leaves `trees` untouched.
    pub fn splice_scored(
        &self,
        trees: &mut LocalTrees,
        proposal: &Proposal,
    ) -> Result<Option<(SpliceUndo, f64)>, ArgError> {
        let (mut lo, mut hi) = proposal.score_window(trees);
        let ntimes = self.settings.ntimes;
        let mut before = self.joint(trees, (lo, hi));
        let splice = |trees: &mut LocalTrees| {
            trees.splice(proposal.first, proposal.last, proposal.segments.clone(), ntimes)
        };
        let Some(mut undo) = splice(trees)? else {
            return Ok(None);
        };
        if let Some(span) = undo.relinked() {
            if span.start < lo || span.end > hi {
                lo = lo.min(span.start);
                hi = hi.max(span.end).min(trees.end());
                trees.undo(undo);
                before = self.joint(trees, (lo, hi));
                undo = match splice(trees)? {
                    Some(undo) => undo,
                    None => return Ok(None),
                };
                trace!(lo, hi, "widened score window to relinked breakpoints");
            }
        }
        let after = self.joint(trees, (lo, hi));
        Ok(Some((undo, after - before)))
    }

    fn check(&self, trees: &LocalTrees) {
        if self.check_invariants {
            if let Err(err) = trees.validate(self.settings.ntimes) {
                invariant_violation(&err);
            }
        }
    }
}

/// One Metropolis-Hastings move inside `region`. Returns whether the
/// sequence changed.
pub fn metropolis_step(
    ctx: &MoveContext<'_>,
    trees: &mut LocalTrees,
    region: Region,
    rng: &mut RngHandle,
    tallies: &mut MoveTallies,
) -> Result<bool, ArgError> {
    let shift = trees.num_recombinations() > 0 && rng.uniform() < ctx.settings.shift_fraction;
    let (kind, proposal) = if shift {
        (MoveKind::Shift, moves::propose_shift(trees, region, rng))
    } else {
        (
            MoveKind::Regraft,
            moves::propose_regraft(trees, region, ctx.settings, rng),
        )
    };
    let Some(proposal) = proposal else {
        tallies.record(kind, false);
        return Ok(false);
    };
    let Some((undo, delta)) = ctx.splice_scored(trees, &proposal)? else {
        tallies.record(kind, false);
        return Ok(false);
    };
    let log_alpha =
        ctx.heat * delta + proposal.log_hastings(trees, ctx.settings.prob_path_switch);
    let accept = log_alpha >= 0.0 || rng.uniform().ln() < log_alpha;
    trace!(
        kind = kind.as_str(),
        start = proposal.window.start,
        end = proposal.window.end,
        delta,
        accept,
        "metropolis move"
    );
    if accept {
        ctx.check(trees);
    } else {
        trees.undo(undo);
    }
    tallies.record(kind, accept);
    Ok(accept)
}

/// One climb step: draws several candidates (merges with probability
/// `recomb_preference`), weighs them against each other by their joint
/// probability change and a bias per removed recombination, and applies the
/// sampled one without a Metropolis test. Returns `false` only when no
/// candidate could be built.
pub fn climb_step(
    ctx: &MoveContext<'_>,
    trees: &mut LocalTrees,
    region: Region,
    rng: &mut RngHandle,
    tallies: &mut MoveTallies,
) -> Result<bool, ArgError> {
    let preference = ctx.settings.recomb_preference;
    let bias = (preference / (1.0 - preference)).ln();
    let mut candidates: Vec<Proposal> = Vec::new();
    let mut weights = Vec::new();
    for _ in 0..ctx.settings.climb_candidates {
        let merge = trees.num_recombinations() > 0 && rng.uniform() < preference;
        let (kind, proposal) = if merge {
            (MoveKind::Merge, moves::propose_merge(trees, region, rng))
        } else {
            (
                MoveKind::Regraft,
                moves::propose_regraft(trees, region, ctx.settings, rng),
            )
        };
        let Some(proposal) = proposal else {
            tallies.record(kind, false);
            continue;
        };
        let recombs = trees.num_recombinations() as f64;
        let Some((undo, delta)) = ctx.splice_scored(trees, &proposal)? else {
            tallies.record(kind, false);
            continue;
        };
        let removed = recombs - trees.num_recombinations() as f64;
        trees.undo(undo);
        weights.push(delta + removed * bias);
        candidates.push(proposal);
    }

    let Some(choice) = sample_log_weights(&weights, rng) else {
        for candidate in &candidates {
            tallies.record(candidate.kind, false);
        }
        return Ok(false);
    };
    for (idx, candidate) in candidates.iter().enumerate() {
        if idx != choice {
            tallies.record(candidate.kind, false);
        }
    }
    let chosen = &candidates[choice];
    let applied = trees
        .splice(
            chosen.first,
            chosen.last,
            chosen.segments.clone(),
            ctx.settings.ntimes,
        )?
        .is_some();
    if applied {
        ctx.check(trees);
    }
    tallies.record(chosen.kind, applied);
    Ok(applied)
}
