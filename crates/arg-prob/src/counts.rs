//! Sufficient statistics for population-size estimation.

use serde::{Deserialize, Serialize};

/// Coalescence and non-coalescence tallies per half-step.
///
/// `nocoal[h]` counts lineage pairs (or free lineages against the standing
/// tree) that were exposed to coalescence through half-step `h` without
/// merging; `coal[h]` counts the coalescences assigned to `h`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoalCounts {
    /// Coalescence events per half-step.
    pub coal: Vec<f64>,
    /// Exposure counts per half-step.
    pub nocoal: Vec<f64>,
}

impl CoalCounts {
    /// Zeroed tallies for `nsteps` half-steps.
    pub fn new(nsteps: usize) -> Self {
        Self {
            coal: vec![0.0; nsteps],
            nocoal: vec![0.0; nsteps],
        }
    }

    /// Number of half-steps.
    pub fn nsteps(&self) -> usize {
        self.coal.len()
    }

    /// Total number of coalescences.
    pub fn total_coal(&self) -> f64 {
        self.coal.iter().sum()
    }

    /// Resets every tally to zero.
    pub fn clear(&mut self) {
        self.coal.iter_mut().for_each(|c| *c = 0.0);
        self.nocoal.iter_mut().for_each(|c| *c = 0.0);
    }

    /// Adds `other` element-wise.
    pub fn add(&mut self, other: &CoalCounts) {
        for (a, b) in self.coal.iter_mut().zip(&other.coal) {
            *a += b;
        }
        for (a, b) in self.nocoal.iter_mut().zip(&other.nocoal) {
            *a += b;
        }
    }
}
