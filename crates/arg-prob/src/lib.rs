#![deny(missing_docs)]
//! Log-space prior and likelihood of ARGs under the discretized
//! coalescent with recombination and the Jukes-Cantor mutation model.
//!
//! Every function here is a pure function of its inputs.

/// Single-tree and single-event coalescent densities.
pub mod coal;
/// Sufficient statistics for population-size updates.
pub mod counts;
/// Joint scoring.
pub mod joint;
/// Mutation likelihood.
pub mod likelihood;
/// Local-tree sequence prior.
pub mod prior;

pub use coal::{calc_log_coal_prob, calc_log_spr_prob, calc_tree_prior, spr_lineages};
pub use counts::CoalCounts;
pub use joint::{calc_arg_joint_prob, score_arg, score_window, ArgScore};
pub use likelihood::{
    calc_arg_likelihood, calc_arg_likelihood_mapped, calc_tree_likelihood_spans,
};
pub use prior::{calc_arg_prior, calc_arg_prior_counts, calc_arg_prior_full};
