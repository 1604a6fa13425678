//! Grouping of half-steps into shared population-size parameters.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use arg_core::{ArgError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// One population-size parameter shared by a set of half-steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopsizeParam {
    /// Display name of the parameter.
    pub name: String,
    /// Whether the estimator may update this parameter.
    pub sample: bool,
    /// Half-step indices governed by the parameter.
    pub steps: BTreeSet<usize>,
}

fn default_prior_alpha() -> f64 {
    1.0
}

fn default_prior_beta() -> f64 {
    1e-4
}

/// Population-size parameter layout plus the Gamma prior used when sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopsizeConfig {
    /// Parameters in declaration order.
    pub params: Vec<PopsizeParam>,
    /// Shape of the Gamma prior on each population size.
    #[serde(default = "default_prior_alpha")]
    pub prior_alpha: f64,
    /// Rate of the Gamma prior on each population size.
    #[serde(default = "default_prior_beta")]
    pub prior_beta: f64,
}

impl PopsizeConfig {
    /// One sampled parameter per half-step, named `N0`, `N1`, ...
    pub fn per_step(nsteps: usize) -> Self {
        let params = (0..nsteps)
            .map(|h| PopsizeParam {
                name: format!("N{h}"),
                sample: true,
                steps: BTreeSet::from([h]),
            })
            .collect();
        Self {
            params,
            prior_alpha: default_prior_alpha(),
            prior_beta: default_prior_beta(),
        }
    }

    /// Adds half-step `step` to the parameter called `name`, creating it when
    /// needed. Conflicting `sample` flags for one name are rejected.
    pub fn add_step(&mut self, name: &str, step: usize, sample: bool) -> Result<(), ArgError> {
        if let Some(param) = self.params.iter_mut().find(|p| p.name == name) {
            if param.sample != sample {
                return Err(ArgError::Config(
                    ErrorInfo::new(
                        "popsize-sample-conflict",
                        "population-size parameter declared with conflicting sample flags",
                    )
                    .with_context("name", name.to_string())
                    .with_context("step", step.to_string()),
                ));
            }
            param.steps.insert(step);
        } else {
            self.params.push(PopsizeParam {
                name: name.to_string(),
                sample,
                steps: BTreeSet::from([step]),
            });
        }
        Ok(())
    }

    /// Reads a config table: one line per half-step (`2 * ntimes - 1` lines)
    /// holding `name [popsize [sample]]`, tab or space separated.
    ///
    /// Population sizes given in the table overwrite `popsizes[step]`.
    pub fn parse(text: &str, nsteps: usize, popsizes: &mut [f64]) -> Result<Self, ArgError> {
        let mut config = Self {
            params: Vec::new(),
            prior_alpha: default_prior_alpha(),
            prior_beta: default_prior_beta(),
        };
        let mut step = 0usize;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if step >= nsteps {
                return Err(ArgError::Config(
                    ErrorInfo::new("popsize-config-too-long", "too many lines in popsize config")
                        .with_context("expected", nsteps.to_string())
                        .with_context("line", (lineno + 1).to_string()),
                ));
            }
            let mut fields = line.split_whitespace();
            let name = fields.next().unwrap_or_default();
            if let Some(value) = fields.next() {
                let popsize: f64 = value.parse().map_err(|_| {
                    ArgError::Config(
                        ErrorInfo::new("popsize-config-value", "population size is not a number")
                            .with_context("line", (lineno + 1).to_string())
                            .with_context("value", value.to_string()),
                    )
                })?;
                if !(popsize > 0.0 && popsize.is_finite()) {
                    return Err(ArgError::Config(
                        ErrorInfo::new("popsize-invalid", "population sizes must be positive")
                            .with_context("line", (lineno + 1).to_string()),
                    ));
                }
                if let Some(slot) = popsizes.get_mut(step) {
                    *slot = popsize;
                }
            }
            let sample = match fields.next() {
                None => true,
                Some(flag) => parse_flag(flag).ok_or_else(|| {
                    ArgError::Config(
                        ErrorInfo::new("popsize-config-flag", "sample flag must be 0 or 1")
                            .with_context("line", (lineno + 1).to_string())
                            .with_context("value", flag.to_string()),
                    )
                })?,
            };
            config.add_step(name, step, sample)?;
            step += 1;
        }
        if step != nsteps {
            return Err(ArgError::Config(
                ErrorInfo::new("popsize-config-too-short", "too few lines in popsize config")
                    .with_context("expected", nsteps.to_string())
                    .with_context("found", step.to_string()),
            ));
        }
        Ok(config)
    }

    /// Reads [`PopsizeConfig::parse`] input from disk.
    pub fn load(path: &Path, nsteps: usize, popsizes: &mut [f64]) -> Result<Self, ArgError> {
        let text = fs::read_to_string(path)
            .map_err(|err| ArgError::io("popsize-config-read", err, path))?;
        Self::parse(&text, nsteps, popsizes)
    }

    /// Splits every multi-step parameter into one parameter per step.
    pub fn split(&mut self) {
        let mut split = Vec::new();
        for param in self.params.drain(..) {
            if param.steps.len() <= 1 {
                split.push(param);
                continue;
            }
            for &step in &param.steps {
                split.push(PopsizeParam {
                    name: format!("{}.{step}", param.name),
                    sample: param.sample,
                    steps: BTreeSet::from([step]),
                });
            }
        }
        self.params = split;
    }

    /// Fails unless every half-step below `nsteps` belongs to exactly one parameter.
    pub fn check_covers(&self, nsteps: usize) -> Result<(), ArgError> {
        let mut seen = vec![false; nsteps];
        for param in &self.params {
            for &step in &param.steps {
                match seen.get_mut(step) {
                    Some(slot) if !*slot => *slot = true,
                    _ => {
                        return Err(ArgError::Config(
                            ErrorInfo::new(
                                "popsize-config-step",
                                "half-step missing, duplicated or out of range",
                            )
                            .with_context("param", param.name.clone())
                            .with_context("step", step.to_string()),
                        ))
                    }
                }
            }
        }
        if let Some(step) = seen.iter().position(|s| !s) {
            return Err(ArgError::Config(
                ErrorInfo::new("popsize-config-step", "half-step not assigned to a parameter")
                    .with_context("step", step.to_string()),
            ));
        }
        Ok(())
    }
}

fn parse_flag(flag: &str) -> Option<bool> {
    match flag {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
