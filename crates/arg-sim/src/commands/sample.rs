use std::error::Error;
use std::path::PathBuf;

use arg_core::Region;
use arg_mcmc::{run_sampler, PopsizeMethod, SamplerConfig};
use clap::{ArgAction, Args};

#[derive(Args, Debug, Default)]
pub struct SampleArgs {
    /// YAML configuration; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Alignment in sites format.
    #[arg(short = 's', long, conflicts_with = "fasta")]
    pub sites: Option<PathBuf>,
    /// Alignment in FASTA format.
    #[arg(short = 'f', long)]
    pub fasta: Option<PathBuf>,
    /// Chromosome name for FASTA input.
    #[arg(long)]
    pub chrom: Option<String>,
    /// Initial ARG in `.smc` format.
    #[arg(short = 'a', long)]
    pub arg: Option<PathBuf>,
    /// Restrict the input to `start-end`.
    #[arg(long)]
    pub subregion: Option<Region>,
    /// Alignment compression factor.
    #[arg(short = 'c', long)]
    pub compress_seq: Option<usize>,
    /// Mask of positions treated as missing data.
    #[arg(long)]
    pub maskmap: Option<PathBuf>,
    /// Output prefix.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
    /// Master random seed.
    #[arg(short = 'x', long)]
    pub seed: Option<u64>,
    /// Number of time points.
    #[arg(short = 't', long)]
    pub ntimes: Option<usize>,
    /// Oldest time point, in generations.
    #[arg(long)]
    pub maxtime: Option<f64>,
    /// Linear time step; selects a linear grid.
    #[arg(long)]
    pub time_step: Option<f64>,
    /// Comma-separated explicit time points.
    #[arg(long, value_delimiter = ',')]
    pub times: Option<Vec<f64>>,
    /// Effective population size.
    #[arg(short = 'N', long)]
    pub popsize: Option<f64>,
    /// Population-size parameter file.
    #[arg(long)]
    pub popsize_config: Option<PathBuf>,
    /// Mutation rate per site per generation.
    #[arg(short = 'm', long)]
    pub mutrate: Option<f64>,
    /// Recombination rate per site per generation.
    #[arg(short = 'r', long)]
    pub recombrate: Option<f64>,
    /// Mutation-rate map.
    #[arg(long)]
    pub mutmap: Option<PathBuf>,
    /// Recombination-rate map.
    #[arg(long)]
    pub recombmap: Option<PathBuf>,
    /// Climb iterations.
    #[arg(long)]
    pub climb: Option<usize>,
    /// Resampling iterations.
    #[arg(short = 'n', long)]
    pub iters: Option<usize>,
    /// Iterations between written ARGs.
    #[arg(long)]
    pub sample_step: Option<usize>,
    /// Resample only `start-end`.
    #[arg(long)]
    pub resample_region: Option<Region>,
    /// Continue a previous run with the same prefix.
    #[arg(long)]
    pub resume: bool,
    /// Probability of pruning at the nearest recombination.
    #[arg(long)]
    pub prob_path_switch: Option<f64>,
    /// Re-estimate population sizes every this many iterations.
    #[arg(long)]
    pub popsize_every: Option<usize>,
    /// Use HMC instead of the maximum-likelihood update.
    #[arg(long)]
    pub popsize_hmc: bool,
    /// Write plain `.smc` files.
    #[arg(long)]
    pub no_compress_output: bool,
    /// Validate the ARG after every accepted move.
    #[arg(long)]
    pub check_invariants: bool,
    /// Skip the JSON run manifest.
    #[arg(long)]
    pub no_manifest: bool,
    /// Increase log verbosity.
    #[arg(short = 'V', long, action = ArgAction::Count)]
    pub verbose: u8,
    /// Do not log to stderr.
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

pub fn run(args: &SampleArgs) -> Result<(), Box<dyn Error>> {
    let config = build_config(args)?;
    let summary = run_sampler(&config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.interrupted {
        return Err("sampling stopped before completion".into());
    }
    Ok(())
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn set_some<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *target = value.clone();
    }
}

pub fn build_config(args: &SampleArgs) -> Result<SamplerConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => SamplerConfig::load(path)?,
        None => SamplerConfig::default(),
    };
    if args.sites.is_some() {
        config.input.sites = args.sites.clone();
        config.input.fasta = None;
    }
    if args.fasta.is_some() {
        config.input.fasta = args.fasta.clone();
        config.input.sites = None;
    }
    set(&mut config.input.chrom, &args.chrom);
    set_some(&mut config.input.arg, &args.arg);
    set_some(&mut config.input.subregion, &args.subregion);
    set(&mut config.input.compress_seq, &args.compress_seq);
    set_some(&mut config.input.maskmap, &args.maskmap);

    let model = &mut config.model;
    set(&mut model.ntimes, &args.ntimes);
    set(&mut model.maxtime, &args.maxtime);
    set_some(&mut model.time_step, &args.time_step);
    set_some(&mut model.times, &args.times);
    set(&mut model.popsize, &args.popsize);
    set_some(&mut model.popsize_config, &args.popsize_config);
    set(&mut model.mutrate, &args.mutrate);
    set(&mut model.recombrate, &args.recombrate);
    set_some(&mut model.mutmap, &args.mutmap);
    set_some(&mut model.recombmap, &args.recombmap);

    let search = &mut config.search;
    set(&mut search.climb, &args.climb);
    set(&mut search.iters, &args.iters);
    set(&mut search.sample_step, &args.sample_step);
    set_some(&mut search.resample_region, &args.resample_region);
    set(&mut search.prob_path_switch, &args.prob_path_switch);
    search.resume |= args.resume;

    set(&mut config.popsize_estimation.every, &args.popsize_every);
    if args.popsize_hmc {
        config.popsize_estimation.method = PopsizeMethod::Hmc;
    }

    set(&mut config.output.prefix, &args.output);
    config.output.no_compress_output |= args.no_compress_output;
    config.output.check_invariants |= args.check_invariants;
    if args.no_manifest {
        config.output.write_manifest = false;
    }
    config.logging.verbose = config.logging.verbose.saturating_add(args.verbose);
    config.logging.quiet |= args.quiet;
    set(&mut config.seed, &args.seed);

    config.validate()?;
    Ok(config)
}
