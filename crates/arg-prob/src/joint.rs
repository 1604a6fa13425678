//! Joint prior and likelihood of an ARG.

use arg_core::Coord;
use arg_model::ArgModel;
use arg_tree::{LocalTrees, Sequences};
use serde::{Deserialize, Serialize};

use crate::likelihood::calc_arg_likelihood;
use crate::prior::calc_arg_prior;

/// Log prior, log likelihood and their sum for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArgScore {
    /// Coalescent-with-recombination log prior.
    pub prior: f64,
    /// Mutation log likelihood.
    pub likelihood: f64,
    /// Sum of both.
    pub joint: f64,
}

/// Scores the window `[start, end)`.
pub fn score_window(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    start: Coord,
    end: Coord,
) -> ArgScore {
    let prior = calc_arg_prior(model, trees, start, end);
    let likelihood = calc_arg_likelihood(model, seqs, trees, start, end);
    ArgScore {
        prior,
        likelihood,
        joint: prior + likelihood,
    }
}

/// Scores the whole ARG.
pub fn score_arg(model: &ArgModel, seqs: &Sequences, trees: &LocalTrees) -> ArgScore {
    score_window(model, seqs, trees, trees.start(), trees.end())
}

/// Log joint probability of the window `[start, end)`.
pub fn calc_arg_joint_prob(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    start: Coord,
    end: Coord,
) -> f64 {
    score_window(model, seqs, trees, start, end).joint
}
