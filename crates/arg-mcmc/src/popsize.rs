//! Re-estimation of population sizes from the coalescence tallies of the
//! current ARG.
//!
//! Per parameter group the prior behaves like `-E / (2N) - C ln(2N)`, where
//! `C` counts coalescences attributed to the group and `E` is the exposure
//! `sum(nocoal[h] * dt[h])` over its finite half-steps. The maximum is at
//! `N = E / (2C)`; the sampler variant runs one HMC transition on `ln N`
//! under the Gamma prior of the popsize configuration.

use arg_core::{ArgError, RngHandle};
use arg_model::ArgModel;
use arg_prob::{calc_arg_prior_counts, CoalCounts};
use arg_tree::LocalTrees;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::config::{PopsizeEstimationConfig, PopsizeMethod};

/// Sufficient statistics of one sampled parameter group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    /// Index into the popsize configuration's parameters.
    pub param: usize,
    /// Coalescences attributed to the group.
    pub coal: f64,
    /// Lineage-pair exposure in generations.
    pub exposure: f64,
}

/// Sums `counts` over every sampled group of the model's popsize
/// configuration.
pub fn group_stats(model: &ArgModel, counts: &CoalCounts) -> Vec<GroupStats> {
    let steps = model.coal_time_steps();
    model
        .popsize_config()
        .params
        .iter()
        .enumerate()
        .filter(|(_, param)| param.sample)
        .map(|(param, group)| {
            let mut coal = 0.0;
            let mut exposure = 0.0;
            for &h in &group.steps {
                coal += counts.coal[h];
                if steps[h].is_finite() {
                    exposure += counts.nocoal[h] * steps[h];
                }
            }
            GroupStats {
                param,
                coal,
                exposure,
            }
        })
        .collect()
}

/// Periodic population-size updater.
#[derive(Debug, Clone, PartialEq)]
pub struct PopsizeEstimator {
    config: PopsizeEstimationConfig,
}

impl PopsizeEstimator {
    /// Estimator with the given settings.
    pub fn new(config: PopsizeEstimationConfig) -> Self {
        Self { config }
    }

    /// Whether an update is due after iteration `iter`.
    pub fn due(&self, iter: usize) -> bool {
        self.config.every > 0 && (iter + 1) % self.config.every == 0
    }

    /// Re-estimates the sampled population sizes from `trees` and writes
    /// them back into `model`.
    pub fn update(
        &self,
        model: &mut ArgModel,
        trees: &LocalTrees,
        rng: &mut RngHandle,
    ) -> Result<(), ArgError> {
        let counts = calc_arg_prior_counts(model, trees);
        let stats = group_stats(model, &counts);
        let current: Vec<f64> = stats
            .iter()
            .map(|group| {
                let steps = &model.popsize_config().params[group.param].steps;
                steps.iter().next().map_or(1.0, |&h| model.popsize(h))
            })
            .collect();
        let estimates = match self.config.method {
            PopsizeMethod::Mle => mle(&stats, &current),
            PopsizeMethod::Hmc => {
                let config = model.popsize_config();
                let prior = (config.prior_alpha, config.prior_beta);
                hmc(&stats, &current, prior, &self.config, rng)
            }
        };
        let mut popsizes = model.popsizes().to_vec();
        for (group, estimate) in stats.iter().zip(estimates) {
            let value = estimate.clamp(self.config.min, self.config.max);
            for &h in &model.popsize_config().params[group.param].steps {
                popsizes[h] = value;
            }
            debug!(
                param = %model.popsize_config().params[group.param].name,
                coal = group.coal,
                exposure = group.exposure,
                popsize = value,
                "updated population size"
            );
        }
        model.set_popsizes(popsizes)
    }
}

/// `E / (2C)` per group; groups without coalescences keep their value.
pub fn mle(stats: &[GroupStats], current: &[f64]) -> Vec<f64> {
    stats
        .iter()
        .zip(current)
        .map(|(group, &value)| {
            if group.coal > 0.0 && group.exposure > 0.0 {
                group.exposure / (2.0 * group.coal)
            } else {
                value
            }
        })
        .collect()
}

fn log_posterior(group: &GroupStats, theta: f64, (alpha, beta): (f64, f64)) -> f64 {
    -0.5 * group.exposure * (-theta).exp() - group.coal * (theta + 2f64.ln()) + alpha * theta
        - beta * theta.exp()
}

fn gradient(group: &GroupStats, theta: f64, (alpha, beta): (f64, f64)) -> f64 {
    0.5 * group.exposure * (-theta).exp() - group.coal + alpha - beta * theta.exp()
}

/// One HMC transition on the log population sizes of all groups.
pub fn hmc(
    stats: &[GroupStats],
    current: &[f64],
    prior: (f64, f64),
    config: &PopsizeEstimationConfig,
    rng: &mut RngHandle,
) -> Vec<f64> {
    let eps = config.step_size;
    let start: Vec<f64> = current.iter().map(|n| n.ln()).collect();
    let momentum: Vec<f64> = start
        .iter()
        .map(|_| StandardNormal.sample(&mut *rng))
        .collect();

    let mut theta = start.clone();
    let mut p = momentum.clone();
    let grad = |theta: &[f64], out: &mut Vec<f64>| {
        out.clear();
        out.extend(stats.iter().zip(theta).map(|(g, &t)| gradient(g, t, prior)));
    };
    let mut g = Vec::with_capacity(stats.len());
    grad(&theta, &mut g);
    for _ in 0..config.leapfrog_steps.max(1) {
        for (pi, gi) in p.iter_mut().zip(&g) {
            *pi += 0.5 * eps * gi;
        }
        for (ti, pi) in theta.iter_mut().zip(&p) {
            *ti += eps * pi;
        }
        grad(&theta, &mut g);
        for (pi, gi) in p.iter_mut().zip(&g) {
            *pi += 0.5 * eps * gi;
        }
    }

    let energy = |theta: &[f64], p: &[f64]| -> f64 {
        let potential: f64 = stats
            .iter()
            .zip(theta)
            .map(|(g, &t)| -log_posterior(g, t, prior))
            .sum();
        let kinetic: f64 = p.iter().map(|x| 0.5 * x * x).sum();
        potential + kinetic
    };
    let log_accept = energy(&start, &momentum) - energy(&theta, &p);
    let accept = log_accept >= 0.0 || rng.uniform().ln() < log_accept;
    let chosen = if accept { theta } else { start };
    chosen.into_iter().map(f64::exp).collect()
}
