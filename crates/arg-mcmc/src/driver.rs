//! The sampling control loop.
//!
//! Stages run in the order `seq -> climb -> resample`, or `seq ->
//! resample_region` when a region is configured. A resumed run goes straight
//! to `resample` at the iteration after its checkpoint. Each iteration
//! draws from its own random stream, so replaying a stage from a checkpoint
//! replays its draws.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arg_core::{
    invariant_violation, ArgError, ErrorInfo, Region, RngHandle, RunProvenance, SchemaVersion,
};
use arg_model::ArgModel;
use arg_prob::{score_arg, ArgScore};
use arg_tree::{
    canonical_hash, count_noncompat, same_tree, store_arg, uncompress_local_trees, LocalTree,
    LocalTrees, Sequences, SitesMapping,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::config::SamplerConfig;
use crate::determinism::{iteration_seed, popsize_seed, Stage};
use crate::kernel::{climb_step, metropolis_step, MoveContext, MoveTallies};
use crate::logging::LogContext;
use crate::manifest::RunManifest;
use crate::moves::MoveSettings;
use crate::popsize::PopsizeEstimator;
use crate::resume::ResumePoint;
use crate::seq_sample::sample_arg_seq;
use crate::setup::{prepare, SamplerInputs};
use crate::stats::{OutputPaths, StatsLog, StatsRow};
#[cfg(feature = "mc3")]
use crate::tempering::{attempt_swap, ChainExchange};

/// Cooperative cancellation flag shared with the driver.
///
/// A requested stop lets the current iteration finish, writes the ARG and
/// ends the run.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Creates a handle with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop after its current iteration.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Score of the final ARG.
    pub final_score: ArgScore,
    /// Canonical hash of the final ARG in original coordinates.
    pub arg_hash: String,
    /// Leaves of the final ARG.
    pub nleaves: usize,
    /// Recombinations of the final ARG.
    pub recombs: usize,
    /// Acceptance rate per move kind.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Stats log.
    pub stats_path: PathBuf,
    /// ARG files written, in order.
    pub args: Vec<PathBuf>,
    /// Manifest, if written.
    pub manifest_path: Option<PathBuf>,
    /// Whether the run stopped early on request.
    pub interrupted: bool,
}

/// Owns the model, the alignment and the ARG for the life of a run.
pub struct GibbsDriver {
    config: SamplerConfig,
    model: ArgModel,
    seqs: Sequences,
    trees: LocalTrees,
    mapping: Option<SitesMapping>,
    paths: OutputPaths,
    stats: StatsLog,
    settings: MoveSettings,
    tallies: MoveTallies,
    estimator: Option<PopsizeEstimator>,
    stop: StopHandle,
    resume: Option<ResumePoint>,
    written: Vec<PathBuf>,
    heat: f64,
    interrupted: bool,
    #[cfg(feature = "mc3")]
    exchange: Option<Box<dyn ChainExchange>>,
}

impl GibbsDriver {
    /// Creates a driver over prepared inputs. Opens the stats log, appending
    /// when resuming.
    pub fn new(
        config: SamplerConfig,
        inputs: SamplerInputs,
        paths: OutputPaths,
    ) -> Result<Self, ArgError> {
        let stats = match inputs.resume {
            Some(_) => StatsLog::append(&paths.stats())?,
            None => StatsLog::create(&paths.stats())?,
        };
        let settings = MoveSettings::from_config(&config, inputs.model.ntimes());
        let estimator = (config.popsize_estimation.every > 0)
            .then(|| PopsizeEstimator::new(config.popsize_estimation.clone()));
        let heat = config.heat;
        Ok(Self {
            config,
            model: inputs.model,
            seqs: inputs.seqs,
            trees: inputs.trees,
            mapping: inputs.mapping,
            paths,
            stats,
            settings,
            tallies: MoveTallies::new(),
            estimator,
            stop: StopHandle::new(),
            resume: inputs.resume,
            written: Vec::new(),
            heat,
            interrupted: false,
            #[cfg(feature = "mc3")]
            exchange: None,
        })
    }

    /// Current ARG in sampler coordinates.
    pub fn trees(&self) -> &LocalTrees {
        &self.trees
    }

    /// Current model.
    pub fn model(&self) -> &ArgModel {
        &self.model
    }

    /// Alignment in sampler coordinates.
    pub fn seqs(&self) -> &Sequences {
        &self.seqs
    }

    /// Current heat.
    pub fn heat(&self) -> f64 {
        self.heat
    }

    /// Handle that stops the run after its current iteration.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Replaces the stop handle, e.g. with one shared by several drivers.
    pub fn set_stop_handle(&mut self, stop: StopHandle) {
        self.stop = stop;
    }

    /// Installs a peer chain for state exchanges every `exchange_every`
    /// resampling iterations.
    #[cfg(feature = "mc3")]
    pub fn set_exchange(&mut self, exchange: Box<dyn ChainExchange>) {
        self.exchange = Some(exchange);
    }

    /// Move acceptance so far.
    pub fn tallies(&self) -> &MoveTallies {
        &self.tallies
    }

    fn full_region(&self) -> Region {
        Region {
            start: self.trees.start(),
            end: self.trees.end(),
        }
    }

    fn check_invariants(&self) {
        if self.config.output.check_invariants {
            if let Err(err) = self.trees.validate(self.model.ntimes()) {
                invariant_violation(&err);
            }
        }
    }

    fn log_stats(&mut self, stage: Stage, iter: usize) -> Result<ArgScore, ArgError> {
        let score = score_arg(&self.model, &self.seqs, &self.trees);
        let row = StatsRow {
            stage: stage.as_str().to_string(),
            iter,
            prior: score.prior,
            likelihood: score.likelihood,
            joint: score.joint,
            recombs: self.trees.num_recombinations(),
            noncompats: count_noncompat(&self.trees, &self.seqs),
        };
        self.stats.write_row(&row)?;
        info!(
            stage = row.stage.as_str(),
            iter,
            prior = row.prior,
            likelihood = row.likelihood,
            joint = row.joint,
            recombs = row.recombs,
            noncompats = row.noncompats,
            "iteration"
        );
        Ok(score)
    }

    /// The ARG in original coordinates.
    pub fn output_trees(&self) -> Result<LocalTrees, ArgError> {
        match &self.mapping {
            Some(mapping) => uncompress_local_trees(&self.trees, mapping, self.model.ntimes()),
            None => Ok(self.trees.clone()),
        }
    }

    fn write_arg(&mut self, path: PathBuf) -> Result<(), ArgError> {
        let trees = self.output_trees()?;
        store_arg(&path, &trees, self.seqs.names(), self.model.times())?;
        debug!(path = %path.display(), "wrote ARG");
        self.written.push(path);
        Ok(())
    }

    /// Handles a pending stop request after iteration `iter` of `stage`.
    fn stop_after(&mut self, stage: Stage, iter: usize, written: bool) -> Result<bool, ArgError> {
        if !self.stop.is_stop_requested() {
            return Ok(false);
        }
        if !written {
            self.write_arg(self.paths.stage_arg(stage, iter))?;
        }
        warn!(stage = stage.as_str(), iter, "stop requested; ending run");
        self.interrupted = true;
        Ok(true)
    }

    fn update_popsizes(&mut self, stage: Stage, iter: usize) -> Result<(), ArgError> {
        let Some(estimator) = &self.estimator else {
            return Ok(());
        };
        if !estimator.due(iter) {
            return Ok(());
        }
        let mut rng = RngHandle::from_seed(popsize_seed(self.config.seed, stage, iter));
        estimator.update(&mut self.model, &self.trees, &mut rng)
    }

    #[cfg(feature = "mc3")]
    fn exchange_heat(&mut self, iter: usize, joint: f64) {
        let every = self.config.exchange_every;
        if every == 0 || iter % every != 0 {
            return;
        }
        let Some(exchange) = self.exchange.as_mut() else {
            return;
        };
        if let Some((peer_heat, peer_joint)) = exchange.propose_swap(iter, self.heat, joint) {
            let seed = crate::determinism::exchange_seed(self.config.seed, iter);
            let mut rng = RngHandle::from_seed(seed);
            let (accepted, probability) =
                attempt_swap(self.heat, joint, peer_heat, peer_joint, &mut rng);
            if accepted {
                self.heat = peer_heat;
            }
            exchange.complete_swap(iter, accepted);
            debug!(iter, accepted, probability, heat = self.heat, "chain exchange");
        }
    }

    /// Threads every sequence missing from the ARG into it. Returns whether
    /// anything was added.
    pub fn seq_sample_arg(&mut self) -> Result<bool, ArgError> {
        if self.trees.nleaves() >= self.seqs.nseqs() {
            return Ok(false);
        }
        let _span = info_span!("seq").entered();
        self.trees = sample_arg_seq(&self.model, &self.seqs, self.trees.clone(), self.config.seed)?;
        self.check_invariants();
        let nleaves = self.trees.nleaves();
        self.log_stats(Stage::Seq, nleaves)?;
        self.stop_after(Stage::Seq, nleaves, false)?;
        Ok(true)
    }

    /// Runs the recombination-reducing warm-up.
    pub fn climb_arg(&mut self) -> Result<(), ArgError> {
        let _span = info_span!("climb").entered();
        let region = self.full_region();
        for iter in 0..self.config.search.climb {
            let seed = iteration_seed(self.config.seed, Stage::Climb, iter);
            let mut rng = RngHandle::from_seed(seed);
            let ctx = MoveContext {
                model: &self.model,
                seqs: &self.seqs,
                settings: &self.settings,
                heat: self.heat,
                check_invariants: self.config.output.check_invariants,
            };
            for _ in 0..self.config.moves.moves_per_iteration {
                climb_step(&ctx, &mut self.trees, region, &mut rng, &mut self.tallies)?;
            }
            self.log_stats(Stage::Climb, iter)?;
            if self.stop_after(Stage::Climb, iter, false)? {
                break;
            }
        }
        Ok(())
    }

    fn resample_iteration(
        &mut self,
        stage: Stage,
        iter: usize,
        region: Region,
    ) -> Result<(), ArgError> {
        let mut rng = RngHandle::from_seed(iteration_seed(self.config.seed, stage, iter));
        let ctx = MoveContext {
            model: &self.model,
            seqs: &self.seqs,
            settings: &self.settings,
            heat: self.heat,
            check_invariants: self.config.output.check_invariants,
        };
        for _ in 0..self.config.moves.moves_per_iteration {
            metropolis_step(&ctx, &mut self.trees, region, &mut rng, &mut self.tallies)?;
        }
        Ok(())
    }

    /// Genome-wide resampling from iteration `start`. The ARG is written
    /// every `sample_step` iterations and after the last one.
    pub fn resample_arg_all(&mut self, start: usize) -> Result<(), ArgError> {
        let _span = info_span!("resample", start).entered();
        let region = self.full_region();
        let iters = self.config.search.iters;
        for iter in start..iters {
            self.resample_iteration(Stage::Resample, iter, region)?;
            self.update_popsizes(Stage::Resample, iter)?;
            let _score = self.log_stats(Stage::Resample, iter)?;
            #[cfg(feature = "mc3")]
            self.exchange_heat(iter, _score.joint);
            let sampled = iter % self.config.search.sample_step == 0 || iter + 1 == iters;
            if sampled {
                self.write_arg(self.paths.arg(iter))?;
            }
            if self.stop_after(Stage::Resample, iter, sampled)? {
                break;
            }
        }
        Ok(())
    }

    /// Resamples only `region` (original coordinates) for `iters`
    /// iterations, then writes the ARG. Trees outside the region keep their
    /// topology and ages.
    pub fn resample_arg_region(&mut self, region: Region) -> Result<(), ArgError> {
        let _span = info_span!("resample_region", region = %region).entered();
        let mapped = match &self.mapping {
            Some(mapping) => Region {
                start: mapping.compress(region.start),
                end: mapping.compress(region.end),
            },
            None => region,
        };
        if mapped.is_empty() || !self.full_region().covers(&mapped) {
            return Err(ArgError::Config(
                ErrorInfo::new("region-outside", "resample region outside the ARG")
                    .with_context("region", region.to_string())
                    .with_context("arg", self.full_region().to_string()),
            ));
        }
        let left = self.boundary_tree(mapped.start.checked_sub(1));
        let right = self.boundary_tree(Some(mapped.end));

        let iters = self.config.search.iters;
        let mut last = 0;
        for iter in 0..iters {
            self.resample_iteration(Stage::ResampleRegion, iter, mapped)?;
            self.update_popsizes(Stage::ResampleRegion, iter)?;
            self.log_stats(Stage::ResampleRegion, iter)?;
            last = iter + 1;
            if self.stop.is_stop_requested() {
                warn!(iter, "stop requested; ending region resampling");
                self.interrupted = true;
                break;
            }
        }
        let unchanged = [
            (left, mapped.start.checked_sub(1)),
            (right, Some(mapped.end)),
        ]
        .into_iter()
        .all(|(before, pos)| match (before, self.boundary_tree(pos)) {
            (Some(before), Some(after)) => same_tree(&before, &after),
            (None, None) => true,
            _ => false,
        });
        if !unchanged {
            invariant_violation(&ArgError::Structure(
                ErrorInfo::new("region-boundary", "trees outside the region changed")
                    .with_context("region", mapped.to_string()),
            ));
        }
        let path = if self.interrupted {
            self.paths.arg(last)
        } else {
            self.paths.arg(iters)
        };
        self.write_arg(path)
    }

    fn boundary_tree(&self, pos: Option<usize>) -> Option<LocalTree> {
        pos.and_then(|pos| self.trees.tree_at(pos)).cloned()
    }

    /// Runs the configured stages and returns a summary.
    pub fn run(&mut self) -> Result<RunSummary, ArgError> {
        info!(
            seed = self.config.seed,
            nseqs = self.seqs.nseqs(),
            ntimes = self.model.ntimes(),
            "starting sampler"
        );
        match (self.resume.clone(), self.config.search.resample_region) {
            (Some(point), _) => {
                info!(iter = point.next_iter(), path = %point.arg_path.display(), "resuming");
                self.resample_arg_all(point.next_iter())?;
            }
            (None, Some(region)) => {
                self.seq_sample_arg()?;
                if !self.interrupted {
                    self.resample_arg_region(region)?;
                }
            }
            (None, None) => {
                self.seq_sample_arg()?;
                if !self.interrupted {
                    self.climb_arg()?;
                }
                if !self.interrupted {
                    self.resample_arg_all(0)?;
                }
            }
        }
        self.summary()
    }

    fn summary(&self) -> Result<RunSummary, ArgError> {
        let output = self.output_trees()?;
        Ok(RunSummary {
            final_score: score_arg(&self.model, &self.seqs, &self.trees),
            arg_hash: canonical_hash(&output),
            nleaves: self.trees.nleaves(),
            recombs: self.trees.num_recombinations(),
            acceptance_rates: self.tallies.acceptance_rates(),
            stats_path: self.stats.path().to_path_buf(),
            args: self.written.clone(),
            manifest_path: None,
            interrupted: self.interrupted,
        })
    }
}

/// Runs a complete sampling job: logging, input preparation, the driver and
/// the manifest.
pub fn run_sampler(config: &SamplerConfig) -> Result<RunSummary, ArgError> {
    run_sampler_with_stop(config, StopHandle::new())
}

/// [`run_sampler`] with an externally controlled stop handle.
pub fn run_sampler_with_stop(
    config: &SamplerConfig,
    stop: StopHandle,
) -> Result<RunSummary, ArgError> {
    config.validate()?;
    let paths = OutputPaths::new(&config.output.prefix, !config.output.no_compress_output);
    if let Some(parent) = config
        .output
        .prefix
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        fs::create_dir_all(parent).map_err(|err| ArgError::io("output-mkdir", err, parent))?;
    }
    let log = LogContext::open(Some(&paths.log()), &config.logging, config.search.resume)?;
    let inputs = prepare(config, &paths)?;
    let input_hash = inputs.input_hash.clone();
    let mut driver = GibbsDriver::new(config.clone(), inputs, paths.clone())?;
    driver.set_stop_handle(stop);
    let mut summary = driver.run()?;

    if config.output.write_manifest {
        let manifest = RunManifest {
            config: config.clone(),
            provenance: RunProvenance {
                schema: SchemaVersion::new(1, 0, 0),
                input_hash,
                arg_hash: summary.arg_hash.clone(),
                seed: config.seed,
                created_at: chrono::Utc::now().to_rfc3339(),
                tool_versions: BTreeMap::from([(
                    env!("CARGO_PKG_NAME").to_string(),
                    env!("CARGO_PKG_VERSION").to_string(),
                )]),
            },
            stats_file: summary.stats_path.clone(),
            log_file: log.path().map(|p| p.to_path_buf()),
            args: summary.args.clone(),
            acceptance_rates: summary.acceptance_rates.clone(),
            interrupted: summary.interrupted,
        };
        let path = paths.manifest();
        manifest.write(&path)?;
        summary.manifest_path = Some(path);
    }
    info!(
        joint = summary.final_score.joint,
        recombs = summary.recombs,
        interrupted = summary.interrupted,
        "sampler finished"
    );
    Ok(summary)
}
