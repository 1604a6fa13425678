use std::fs;
use std::path::{Path, PathBuf};

use arg_core::{ArgError, ErrorInfo, Region};
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters of a sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Alignment and starting-ARG inputs.
    #[serde(default)]
    pub input: InputConfig,
    /// Time grid, demography and rates.
    #[serde(default)]
    pub model: ModelConfig,
    /// Stage lengths and resume behaviour.
    #[serde(default)]
    pub search: SearchConfig,
    /// Proposal tuning.
    #[serde(default)]
    pub moves: MoveConfig,
    /// Periodic population-size updates.
    #[serde(default)]
    pub popsize_estimation: PopsizeEstimationConfig,
    /// Output files.
    #[serde(default)]
    pub output: OutputConfig,
    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Master seed for every random substream.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Inverse temperature applied to the joint probability in acceptance.
    #[serde(default = "default_heat")]
    pub heat: f64,
    /// Iterations between state-swap proposals to a peer chain; zero
    /// disables exchanges.
    #[serde(default)]
    pub exchange_every: usize,
}

fn default_seed() -> u64 {
    0x0A5E_ED0F_A26E_5EED
}

fn default_heat() -> f64 {
    1.0
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            moves: MoveConfig::default(),
            popsize_estimation: PopsizeEstimationConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
            seed: default_seed(),
            heat: default_heat(),
            exchange_every: 0,
        }
    }
}

impl SamplerConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ArgError> {
        serde_yaml::from_str(text).map_err(|err| {
            ArgError::Serde(ErrorInfo::new("config-parse", err.to_string()))
        })
    }

    /// Reads a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ArgError> {
        let text = fs::read_to_string(path).map_err(|err| ArgError::io("config-read", err, path))?;
        Self::from_yaml_str(&text).map_err(|err| {
            ArgError::Serde(
                err.info()
                    .clone()
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Rejects inconsistent settings before any input is read.
    pub fn validate(&self) -> Result<(), ArgError> {
        let bad = |code: &str, message: &str| ArgError::Config(ErrorInfo::new(code, message));
        match (&self.input.sites, &self.input.fasta) {
            (None, None) => {
                return Err(ArgError::Config(
                    ErrorInfo::new("input-missing", "either a sites or a FASTA file is required")
                        .with_hint("set input.sites or input.fasta"),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(bad("input-conflict", "sites and FASTA inputs are exclusive"))
            }
            _ => {}
        }
        if self.input.compress_seq == 0 {
            return Err(bad("compress-factor", "compress_seq must be at least one"));
        }
        if self.search.sample_step == 0 {
            return Err(bad("sample-step", "sample_step must be at least one"));
        }
        if !(0.0..=1.0).contains(&self.search.prob_path_switch) {
            return Err(bad("path-switch", "prob_path_switch must lie in [0, 1]"));
        }
        let preference = self.moves.recomb_preference;
        if !(preference > 0.0 && preference < 1.0) {
            return Err(bad("recomb-preference", "recomb_preference must lie in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.moves.shift_fraction) {
            return Err(bad("shift-fraction", "shift_fraction must lie in [0, 1]"));
        }
        if !(self.moves.mean_segment_length >= 1.0) {
            return Err(bad("segment-length", "mean_segment_length must be at least one"));
        }
        if !(self.heat > 0.0 && self.heat.is_finite()) {
            return Err(bad("heat", "heat must be positive and finite"));
        }
        if self.search.resume && self.search.resample_region.is_some() {
            return Err(bad("resume-region", "only full resampling runs can be resumed"));
        }
        let estimation = &self.popsize_estimation;
        if estimation.every > 0 && !(estimation.min > 0.0 && estimation.max >= estimation.min) {
            return Err(bad("popsize-bounds", "popsize estimation bounds are invalid"));
        }
        Ok(())
    }
}

/// Alignment and starting-ARG inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Sites file.
    #[serde(default)]
    pub sites: Option<PathBuf>,
    /// FASTA alignment.
    #[serde(default)]
    pub fasta: Option<PathBuf>,
    /// Chromosome name used for FASTA input.
    #[serde(default = "default_chrom")]
    pub chrom: String,
    /// Initial ARG in `.smc` format.
    #[serde(default)]
    pub arg: Option<PathBuf>,
    /// Restricts the input to a sub-region (0-based, end exclusive).
    #[serde(default)]
    pub subregion: Option<Region>,
    /// Alignment compression factor.
    #[serde(default = "default_compress_seq")]
    pub compress_seq: usize,
    /// Mask of positions treated as missing data.
    #[serde(default)]
    pub maskmap: Option<PathBuf>,
}

fn default_chrom() -> String {
    "chr".into()
}

fn default_compress_seq() -> usize {
    1
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sites: None,
            fasta: None,
            chrom: default_chrom(),
            arg: None,
            subregion: None,
            compress_seq: default_compress_seq(),
            maskmap: None,
        }
    }
}

/// Time grid, demography and rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of time points.
    #[serde(default = "default_ntimes")]
    pub ntimes: usize,
    /// Oldest time point of a log-spaced grid, in generations.
    #[serde(default = "default_maxtime")]
    pub maxtime: f64,
    /// Step of a linear grid; selects linear spacing when set.
    #[serde(default)]
    pub time_step: Option<f64>,
    /// Explicit time points; overrides the other grid settings.
    #[serde(default)]
    pub times: Option<Vec<f64>>,
    /// Curvature of log-spaced grids.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Constant effective population size.
    #[serde(default = "default_popsize")]
    pub popsize: f64,
    /// Population-size table with one line per half-step.
    #[serde(default)]
    pub popsize_config: Option<PathBuf>,
    /// Draws initial population sizes uniformly from `[min, max]`.
    #[serde(default)]
    pub init_popsize_random: Option<(f64, f64)>,
    /// Mutation rate per site per generation.
    #[serde(default = "default_mutrate")]
    pub mutrate: f64,
    /// Recombination rate per site per generation.
    #[serde(default = "default_recombrate")]
    pub recombrate: f64,
    /// Mutation rate map (`chrom start end rate` lines).
    #[serde(default)]
    pub mutmap: Option<PathBuf>,
    /// Recombination rate map (`chrom start end rate` lines).
    #[serde(default)]
    pub recombmap: Option<PathBuf>,
}

fn default_ntimes() -> usize {
    20
}

fn default_maxtime() -> f64 {
    200e3
}

fn default_delta() -> f64 {
    arg_model::DEFAULT_DELTA
}

fn default_popsize() -> f64 {
    1e4
}

fn default_mutrate() -> f64 {
    2.5e-8
}

fn default_recombrate() -> f64 {
    1.5e-8
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            ntimes: default_ntimes(),
            maxtime: default_maxtime(),
            time_step: None,
            times: None,
            delta: default_delta(),
            popsize: default_popsize(),
            popsize_config: None,
            init_popsize_random: None,
            mutrate: default_mutrate(),
            recombrate: default_recombrate(),
            mutmap: None,
            recombmap: None,
        }
    }
}

/// Stage lengths and resume behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Climb iterations after sequential sampling.
    #[serde(default = "default_climb")]
    pub climb: usize,
    /// Resampling iterations.
    #[serde(default = "default_iters")]
    pub iters: usize,
    /// Resample only this region, holding the rest fixed.
    #[serde(default)]
    pub resample_region: Option<Region>,
    /// Continue a previous run from its last written ARG.
    #[serde(default)]
    pub resume: bool,
    /// Probability of pruning the branch that recombines at the nearest
    /// breakpoint instead of a uniform branch.
    #[serde(default = "default_prob_path_switch")]
    pub prob_path_switch: f64,
    /// Iterations between written ARGs.
    #[serde(default = "default_sample_step")]
    pub sample_step: usize,
}

fn default_climb() -> usize {
    50
}

fn default_iters() -> usize {
    1000
}

fn default_prob_path_switch() -> f64 {
    0.1
}

fn default_sample_step() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            climb: default_climb(),
            iters: default_iters(),
            resample_region: None,
            resume: false,
            prob_path_switch: default_prob_path_switch(),
            sample_step: default_sample_step(),
        }
    }
}

/// Proposal tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Metropolis-Hastings moves per resampling iteration.
    #[serde(default = "default_moves_per_iteration")]
    pub moves_per_iteration: usize,
    /// Candidates evaluated per climb step.
    #[serde(default = "default_climb_candidates")]
    pub climb_candidates: usize,
    /// Preference for candidates that remove recombinations while climbing.
    #[serde(default = "default_recomb_preference")]
    pub recomb_preference: f64,
    /// Fraction of moves that shift a breakpoint instead of regrafting.
    #[serde(default = "default_shift_fraction")]
    pub shift_fraction: f64,
    /// Mean length of the genomic segment a regraft is applied to, on each
    /// side of the chosen position.
    #[serde(default = "default_mean_segment_length")]
    pub mean_segment_length: f64,
}

fn default_moves_per_iteration() -> usize {
    20
}

fn default_climb_candidates() -> usize {
    4
}

fn default_recomb_preference() -> f64 {
    0.9
}

fn default_shift_fraction() -> f64 {
    0.25
}

fn default_mean_segment_length() -> f64 {
    200.0
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            moves_per_iteration: default_moves_per_iteration(),
            climb_candidates: default_climb_candidates(),
            recomb_preference: default_recomb_preference(),
            shift_fraction: default_shift_fraction(),
            mean_segment_length: default_mean_segment_length(),
        }
    }
}

/// How population sizes are re-estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopsizeMethod {
    /// Closed-form maximum likelihood per parameter group.
    #[default]
    Mle,
    /// One Hamiltonian Monte Carlo transition on log population sizes.
    Hmc,
}

/// Periodic population-size updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopsizeEstimationConfig {
    /// Iterations between updates; zero disables estimation.
    #[serde(default)]
    pub every: usize,
    /// Estimator.
    #[serde(default)]
    pub method: PopsizeMethod,
    /// Lower clamp.
    #[serde(default = "default_popsize_min")]
    pub min: f64,
    /// Upper clamp.
    #[serde(default = "default_popsize_max")]
    pub max: f64,
    /// Leapfrog step size on the log scale.
    #[serde(default = "default_hmc_step_size")]
    pub step_size: f64,
    /// Leapfrog steps per transition.
    #[serde(default = "default_hmc_steps")]
    pub leapfrog_steps: usize,
}

fn default_popsize_min() -> f64 {
    100.0
}

fn default_popsize_max() -> f64 {
    1e7
}

fn default_hmc_step_size() -> f64 {
    0.05
}

fn default_hmc_steps() -> usize {
    10
}

impl Default for PopsizeEstimationConfig {
    fn default() -> Self {
        Self {
            every: 0,
            method: PopsizeMethod::default(),
            min: default_popsize_min(),
            max: default_popsize_max(),
            step_size: default_hmc_step_size(),
            leapfrog_steps: default_hmc_steps(),
        }
    }
}

/// Output files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path prefix of every output file.
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,
    /// Writes plain `.smc` files instead of `.smc.gz`.
    #[serde(default)]
    pub no_compress_output: bool,
    /// Validates the whole ARG after every accepted move.
    #[serde(default)]
    pub check_invariants: bool,
    /// Writes `<prefix>.manifest.json` at the end of the run.
    #[serde(default = "default_write_manifest")]
    pub write_manifest: bool,
}

fn default_prefix() -> PathBuf {
    PathBuf::from("arg-sample")
}

fn default_write_manifest() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            no_compress_output: false,
            check_invariants: false,
            write_manifest: default_write_manifest(),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 0 = errors, 1 = progress, 2 = debug, 3 = trace.
    #[serde(default = "default_verbose")]
    pub verbose: u8,
    /// Suppresses the stderr copy of the log.
    #[serde(default)]
    pub quiet: bool,
}

fn default_verbose() -> u8 {
    1
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: default_verbose(),
            quiet: false,
        }
    }
}
