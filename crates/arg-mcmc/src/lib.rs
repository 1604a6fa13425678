#![deny(missing_docs)]

//! Gibbs sampler over ancestral recombination graphs: configuration, the
//! staged driver, the move kernel and its run artifacts.

/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation per stage and iteration.
pub mod determinism;
/// Staged control loop and the `run_sampler` entry point.
pub mod driver;
/// Metropolis-Hastings and climbing steps.
pub mod kernel;
/// Tracing subscriber set up per run.
pub mod logging;
/// Run manifest serialization helpers.
pub mod manifest;
/// Proposals over the local-tree sequence.
pub mod moves;
/// Population size re-estimation.
pub mod popsize;
/// Checkpoint lookup for resumed runs.
pub mod resume;
/// Sequential threading of sequences into the ARG.
pub mod seq_sample;
/// Input loading, compression and model construction.
pub mod setup;
/// Stats log and output file names.
pub mod stats;
/// State exchange with chains at other heats.
#[cfg(feature = "mc3")]
pub mod tempering;

pub use config::{
    InputConfig, LoggingConfig, ModelConfig, MoveConfig, OutputConfig, PopsizeEstimationConfig,
    PopsizeMethod, SamplerConfig, SearchConfig,
};
pub use determinism::Stage;
pub use driver::{run_sampler, run_sampler_with_stop, GibbsDriver, RunSummary, StopHandle};
pub use kernel::{MoveContext, MoveTallies};
pub use logging::LogContext;
pub use manifest::RunManifest;
pub use moves::{MoveKind, MoveSettings};
pub use popsize::PopsizeEstimator;
pub use resume::ResumePoint;
pub use setup::{prepare, SamplerInputs};
pub use stats::{OutputPaths, StatsLog, StatsRow};
