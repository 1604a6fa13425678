//! Demographic and mutational parameters of the coalescent-with-recombination.

use arg_core::{ArgError, Coord, ErrorInfo, RngHandle};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::popsize::PopsizeConfig;
use crate::time::TimeModel;
use crate::track::Track;

/// Time grid, per-half-step population sizes and rate maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgModel {
    time: TimeModel,
    popsizes: Vec<f64>,
    /// Default mutation rate per site per generation.
    pub mu: f64,
    /// Default recombination rate per site per generation.
    pub rho: f64,
    mutmap: Track<f64>,
    recombmap: Track<f64>,
    popsize_config: PopsizeConfig,
}

impl ArgModel {
    /// Model with a constant population size.
    pub fn new(time: TimeModel, popsize: f64, mu: f64, rho: f64) -> Result<Self, ArgError> {
        let popsizes = vec![popsize; time.nsteps()];
        Self::with_popsizes(time, popsizes, mu, rho)
    }

    /// Model with one population size per half-step.
    pub fn with_popsizes(
        time: TimeModel,
        popsizes: Vec<f64>,
        mu: f64,
        rho: f64,
    ) -> Result<Self, ArgError> {
        check_rate("mutrate", mu)?;
        check_rate("recombrate", rho)?;
        check_popsizes(&popsizes, time.nsteps())?;
        let popsize_config = PopsizeConfig::per_step(time.nsteps());
        Ok(Self {
            time,
            popsizes,
            mu,
            rho,
            mutmap: Track::new(),
            recombmap: Track::new(),
            popsize_config,
        })
    }

    /// Time grid.
    pub fn time(&self) -> &TimeModel {
        &self.time
    }

    /// Number of time points.
    pub fn ntimes(&self) -> usize {
        self.time.ntimes()
    }

    /// Time points.
    pub fn times(&self) -> &[f64] {
        self.time.times()
    }

    /// Half-step lengths.
    pub fn coal_time_steps(&self) -> &[f64] {
        self.time.coal_time_steps()
    }

    /// Population size for every half-step.
    pub fn popsizes(&self) -> &[f64] {
        &self.popsizes
    }

    /// Population size of half-step `h`.
    pub fn popsize(&self, h: usize) -> f64 {
        self.popsizes[h]
    }

    /// Replaces the population sizes after validating them.
    pub fn set_popsizes(&mut self, popsizes: Vec<f64>) -> Result<(), ArgError> {
        check_popsizes(&popsizes, self.time.nsteps())?;
        self.popsizes = popsizes;
        Ok(())
    }

    /// Parameter grouping used by the population-size estimator.
    pub fn popsize_config(&self) -> &PopsizeConfig {
        &self.popsize_config
    }

    /// Installs a parameter grouping; every half-step must be covered once.
    pub fn set_popsize_config(&mut self, config: PopsizeConfig) -> Result<(), ArgError> {
        config.check_covers(self.time.nsteps())?;
        self.popsize_config = config;
        Ok(())
    }

    /// Draws one population size per sampled parameter uniformly in `[min, max]`.
    pub fn set_popsizes_random(
        &mut self,
        min: f64,
        max: f64,
        rng: &mut RngHandle,
    ) -> Result<(), ArgError> {
        if !(min > 0.0 && max >= min && max.is_finite()) {
            return Err(ArgError::Config(
                ErrorInfo::new("popsize-random-bounds", "random popsize bounds are invalid")
                    .with_context("min", min.to_string())
                    .with_context("max", max.to_string()),
            ));
        }
        for param in &self.popsize_config.params {
            if !param.sample {
                continue;
            }
            let value = if max > min { rng.gen_range(min..=max) } else { min };
            for &step in &param.steps {
                self.popsizes[step] = value;
            }
            debug!(param = %param.name, popsize = value, "random initial population size");
        }
        Ok(())
    }

    /// Mutation map; empty when the scalar rate applies everywhere.
    pub fn mutmap(&self) -> &Track<f64> {
        &self.mutmap
    }

    /// Recombination map; empty when the scalar rate applies everywhere.
    pub fn recombmap(&self) -> &Track<f64> {
        &self.recombmap
    }

    /// Installs a mutation rate map.
    pub fn set_mutmap(&mut self, map: Track<f64>) {
        self.mutmap = map;
    }

    /// Installs a recombination rate map.
    pub fn set_recombmap(&mut self, map: Track<f64>) {
        self.recombmap = map;
    }

    /// Restricts both rate maps to `[start, end)`, completes them with the
    /// scalar rates and splits them at shared breakpoints.
    pub fn setup_maps(&mut self, chrom: &str, start: Coord, end: Coord) -> Result<(), ArgError> {
        let mut mutmap = self.mutmap.clone();
        let mut recombmap = self.recombmap.clone();
        mutmap.clip(start, end);
        recombmap.clip(start, end);
        mutmap.complete(chrom, start, end, self.mu)?;
        recombmap.complete(chrom, start, end, self.rho)?;
        let (mutmap, recombmap) = mutmap.harmonize(&recombmap, start, end)?;
        debug!(
            regions = mutmap.len(),
            chrom, start, end, "harmonized mutation and recombination maps"
        );
        self.mutmap = mutmap;
        self.recombmap = recombmap;
        Ok(())
    }

    /// Mutation rate at `pos`.
    pub fn mu_at(&self, pos: Coord) -> f64 {
        self.mutmap.value_at(pos).copied().unwrap_or(self.mu)
    }

    /// Recombination rate at `pos`.
    pub fn rho_at(&self, pos: Coord) -> f64 {
        self.recombmap.value_at(pos).copied().unwrap_or(self.rho)
    }

    /// Sum of recombination rates over the transitions `[lo, hi)`.
    pub fn recomb_sum(&self, lo: Coord, hi: Coord) -> f64 {
        if self.recombmap.is_empty() {
            return self.rho * hi.saturating_sub(lo) as f64;
        }
        self.recombmap.sum_over(lo, hi, self.rho)
    }

    /// Scales every rate by the alignment compression factor.
    pub fn scale_for_compression(&mut self, factor: usize) {
        let factor = factor as f64;
        self.mu *= factor;
        self.rho *= factor;
        self.mutmap.scale(factor);
        self.recombmap.scale(factor);
    }
}

fn check_rate(name: &str, rate: f64) -> Result<(), ArgError> {
    if rate >= 0.0 && rate.is_finite() {
        Ok(())
    } else {
        Err(ArgError::Config(
            ErrorInfo::new("rate-invalid", "rates must be finite and non-negative")
                .with_context("rate", name.to_string())
                .with_context("value", rate.to_string()),
        ))
    }
}

fn check_popsizes(popsizes: &[f64], nsteps: usize) -> Result<(), ArgError> {
    if popsizes.len() != nsteps {
        return Err(ArgError::Config(
            ErrorInfo::new("popsize-length", "one population size per half-step is required")
                .with_context("expected", nsteps.to_string())
                .with_context("found", popsizes.len().to_string()),
        ));
    }
    if let Some(h) = popsizes.iter().position(|&n| !(n > 0.0 && n.is_finite())) {
        return Err(ArgError::Config(
            ErrorInfo::new("popsize-invalid", "population sizes must be positive and finite")
                .with_context("half_step", h.to_string())
                .with_context("value", popsizes[h].to_string()),
        ));
    }
    Ok(())
}
