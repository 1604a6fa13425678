use std::error::Error;
use std::path::PathBuf;

use arg_mcmc::setup::build_time_model;
use arg_mcmc::SamplerConfig;
use arg_model::ArgModel;
use arg_prob::{score_arg, ArgScore};
use arg_tree::{canonical_hash, count_noncompat, load_arg, Sequences};
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// ARG in `.smc` or `.smc.gz` format.
    #[arg(long)]
    pub arg: PathBuf,
    /// Configuration providing the time grid and rates.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// FASTA alignment to score the ARG against.
    #[arg(long)]
    pub fasta: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ArgReport {
    chrom: String,
    start: usize,
    end: usize,
    nleaves: usize,
    blocks: usize,
    recombs: usize,
    hash: String,
    noncompats: Option<usize>,
    score: Option<ArgScore>,
}

pub fn run(args: &ValidateArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => SamplerConfig::load(path)?,
        None => SamplerConfig::default(),
    };
    let time = build_time_model(&config.model)?;
    let ntimes = time.ntimes();
    let model = ArgModel::new(
        time,
        config.model.popsize,
        config.model.mutrate,
        config.model.recombrate,
    )?;
    let (mut trees, leaf_names) = load_arg(&args.arg, model.time())?;
    trees.validate(ntimes)?;
    let hash = canonical_hash(&trees);

    let (noncompats, score) = match &args.fasta {
        Some(path) => {
            let seqs = Sequences::load_fasta(path)?;
            trees.map_seqids(&leaf_names, seqs.names())?;
            (
                Some(count_noncompat(&trees, &seqs)),
                Some(score_arg(&model, &seqs, &trees)),
            )
        }
        None => (None, None),
    };
    let report = ArgReport {
        chrom: trees.chrom.clone(),
        start: trees.start(),
        end: trees.end(),
        nleaves: trees.nleaves(),
        blocks: trees.len(),
        recombs: trees.num_recombinations(),
        hash,
        noncompats,
        score,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
