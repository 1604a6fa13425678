//! Turns a configuration into the model, alignment and starting ARG of a
//! run, all in the sampler's (possibly compressed) coordinates.

use std::fs;
use std::path::Path;

use arg_core::{ArgError, ErrorInfo, Region, RngHandle};
use arg_model::{ArgModel, NullTrack, PopsizeConfig, TimeModel, Track};
use arg_tree::{
    compress_local_trees, compress_sites, load_arg, LocalTrees, Sequences, Sites, SitesMapping,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{ModelConfig, SamplerConfig};
use crate::determinism::{popsize_seed, Stage};
use crate::resume::{find_resume_point, ResumePoint};
use crate::seq_sample::seed_trees;
use crate::stats::OutputPaths;

/// Everything the driver needs to start sampling.
#[derive(Debug, Clone)]
pub struct SamplerInputs {
    /// Demography and rates, scaled for compression.
    pub model: ArgModel,
    /// Alignment in sampler coordinates.
    pub seqs: Sequences,
    /// Compression mapping, when the alignment was compressed.
    pub mapping: Option<SitesMapping>,
    /// Starting ARG in sampler coordinates.
    pub trees: LocalTrees,
    /// Region of the alignment in original coordinates.
    pub region: Region,
    /// Checkpoint the run continues from.
    pub resume: Option<ResumePoint>,
    /// Digest of the alignment.
    pub input_hash: String,
}

/// Builds the time grid described by `config`.
pub fn build_time_model(config: &ModelConfig) -> Result<TimeModel, ArgError> {
    if let Some(times) = &config.times {
        return TimeModel::from_times(times.clone());
    }
    match config.time_step {
        Some(step) => TimeModel::linear(step, config.ntimes),
        None => TimeModel::log_spaced_with_delta(config.maxtime, config.ntimes, config.delta),
    }
}

fn map_line_error(path: &Path, lineno: usize, message: &str) -> ArgError {
    ArgError::Config(
        ErrorInfo::new("map-parse", message)
            .with_context("path", path.display().to_string())
            .with_context("line", lineno.to_string()),
    )
}

fn read_intervals(
    path: &Path,
    mut add: impl FnMut(&str, usize, usize, Option<&str>, usize) -> Result<(), ArgError>,
) -> Result<(), ArgError> {
    let text = fs::read_to_string(path).map_err(|err| ArgError::io("map-read", err, path))?;
    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(map_line_error(path, lineno, "expected chrom, start and end"));
        }
        let start = fields[1]
            .parse()
            .map_err(|_| map_line_error(path, lineno, "bad start coordinate"))?;
        let end = fields[2]
            .parse()
            .map_err(|_| map_line_error(path, lineno, "bad end coordinate"))?;
        add(fields[0], start, end, fields.get(3).copied(), lineno)?;
    }
    Ok(())
}

/// Reads a rate map of `chrom start end rate` lines (0-based, end
/// exclusive).
pub fn read_rate_map(path: &Path) -> Result<Track<f64>, ArgError> {
    let mut track = Track::new();
    read_intervals(path, |chrom, start, end, value, lineno| {
        let rate: f64 = value
            .ok_or_else(|| map_line_error(path, lineno, "missing rate"))?
            .parse()
            .map_err(|_| map_line_error(path, lineno, "bad rate"))?;
        if !(rate >= 0.0 && rate.is_finite()) {
            return Err(map_line_error(path, lineno, "rates must be non-negative"));
        }
        track.append(chrom, start, end, rate)
    })?;
    Ok(track)
}

/// Reads a mask of `chrom start end` lines.
pub fn read_mask(path: &Path) -> Result<NullTrack, ArgError> {
    let mut track = NullTrack::new();
    read_intervals(path, |chrom, start, end, _, _| track.append(chrom, start, end, ()))?;
    Ok(track)
}

/// Moves the intervals of `track` into compressed coordinates, dropping
/// those that collapse.
pub fn compress_track<T: Clone>(
    track: &Track<T>,
    mapping: &SitesMapping,
) -> Result<Track<T>, ArgError> {
    let mut compressed = Track::new();
    for region in track.iter() {
        let start = mapping.compress(region.start);
        let end = mapping.compress(region.end);
        if start < end {
            compressed.append(region.chrom.clone(), start, end, region.value.clone())?;
        }
    }
    Ok(compressed)
}

/// Digest of the names and bases of an alignment.
pub fn alignment_hash(seqs: &Sequences) -> String {
    let mut hasher = Sha256::new();
    hasher.update((seqs.offset() as u64).to_le_bytes());
    for (idx, name) in seqs.names().iter().enumerate() {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(seqs.seq(idx));
    }
    format!("{:x}", hasher.finalize())
}

fn slice_sequences(seqs: Sequences, region: Region) -> Result<Sequences, ArgError> {
    if region.end > seqs.end() || region.start < seqs.offset() {
        return Err(ArgError::Config(
            ErrorInfo::new("subregion-range", "subregion exceeds the alignment")
                .with_context("subregion", region.to_string())
                .with_context("length", seqs.len().to_string()),
        ));
    }
    let lo = region.start - seqs.offset();
    let hi = region.end - seqs.offset();
    let rows = (0..seqs.nseqs())
        .map(|idx| seqs.seq(idx)[lo..hi].to_vec())
        .collect();
    Sequences::new(seqs.names().to_vec(), rows, region.start)
}

fn build_model(config: &SamplerConfig) -> Result<ArgModel, ArgError> {
    let settings = &config.model;
    let time = build_time_model(settings)?;
    let nsteps = time.nsteps();
    let mut popsizes = vec![settings.popsize; nsteps];
    let popsize_config = match &settings.popsize_config {
        Some(path) => Some(PopsizeConfig::load(path, nsteps, &mut popsizes)?),
        None => None,
    };
    let mut model =
        ArgModel::with_popsizes(time, popsizes, settings.mutrate, settings.recombrate)?;
    if let Some(popsize_config) = popsize_config {
        model.set_popsize_config(popsize_config)?;
    }
    if let Some((min, max)) = settings.init_popsize_random {
        let mut rng = RngHandle::from_seed(popsize_seed(config.seed, Stage::Seq, 0));
        model.set_popsizes_random(min, max, &mut rng)?;
    }
    Ok(model)
}

/// Loads inputs, builds the model and the starting ARG.
pub fn prepare(config: &SamplerConfig, paths: &OutputPaths) -> Result<SamplerInputs, ArgError> {
    config.validate()?;
    let factor = config.input.compress_seq;
    let (chrom, mut sites, mut seqs) = match (&config.input.sites, &config.input.fasta) {
        (Some(path), _) => {
            let sites = Sites::load(path, config.input.subregion)?;
            let seqs = Sequences::from_sites(&sites, b'A')?;
            (sites.chrom.clone(), Some(sites), seqs)
        }
        (None, Some(path)) => {
            let mut seqs = Sequences::load_fasta(path)?;
            if let Some(region) = config.input.subregion {
                seqs = slice_sequences(seqs, region)?;
            }
            (config.input.chrom.clone(), None, seqs)
        }
        (None, None) => {
            return Err(ArgError::Config(ErrorInfo::new(
                "input-missing",
                "either a sites or a FASTA file is required",
            )))
        }
    };
    let region = Region::new(seqs.offset(), seqs.end())?;
    let input_hash = alignment_hash(&seqs);
    info!(
        nseqs = seqs.nseqs(),
        chrom = %chrom,
        region = %region,
        "loaded alignment"
    );

    let mapping = if factor > 1 {
        let mut compressed = match sites.take() {
            Some(sites) => sites,
            None => Sites::from_sequences(&seqs, chrom.clone()),
        };
        let mapping = SitesMapping::find_compress_cols(&compressed, factor)?;
        compress_sites(&mut compressed, &mapping)?;
        seqs = Sequences::from_sites(&compressed, b'A')?;
        debug!(
            factor,
            old_len = region.len(),
            new_len = seqs.len(),
            "compressed alignment"
        );
        Some(mapping)
    } else {
        None
    };

    let mut model = build_model(config)?;
    let mut mutmap = match &config.model.mutmap {
        Some(path) => read_rate_map(path)?,
        None => Track::new(),
    };
    let mut recombmap = match &config.model.recombmap {
        Some(path) => read_rate_map(path)?,
        None => Track::new(),
    };
    if let Some(mapping) = &mapping {
        mutmap = compress_track(&mutmap, mapping)?;
        recombmap = compress_track(&recombmap, mapping)?;
    }
    model.set_mutmap(mutmap);
    model.set_recombmap(recombmap);
    if config.model.mutmap.is_some() || config.model.recombmap.is_some() {
        model.setup_maps(&chrom, seqs.offset(), seqs.end())?;
    }
    model.scale_for_compression(factor);

    if let Some(path) = &config.input.maskmap {
        let mut mask = read_mask(path)?;
        if let Some(mapping) = &mapping {
            mask = compress_track(&mask, mapping)?;
        }
        seqs.apply_mask(&mask);
    }

    let resume = if config.search.resume {
        Some(find_resume_point(paths)?)
    } else {
        None
    };
    let arg_path = resume
        .as_ref()
        .map(|point| point.arg_path.as_path())
        .or(config.input.arg.as_deref());
    let trees = match arg_path {
        Some(path) => {
            let (mut trees, leaf_names) = load_arg(path, model.time())?;
            if trees.start() != region.start || trees.end() != region.end {
                return Err(ArgError::Config(
                    ErrorInfo::new("arg-region-mismatch", "ARG and sequences cover other regions")
                        .with_context("arg", format!("{}-{}", trees.start(), trees.end()))
                        .with_context("sequences", region.to_string())
                        .with_context("path", path.display().to_string()),
                ));
            }
            trees.map_seqids(&leaf_names, seqs.names())?;
            info!(path = %path.display(), blocks = trees.len(), "loaded ARG");
            match &mapping {
                Some(mapping) => compress_local_trees(&trees, mapping, model.ntimes())?,
                None => trees,
            }
        }
        None => seed_trees(&chrom, seqs.offset(), seqs.end())?,
    };

    Ok(SamplerInputs {
        model,
        seqs,
        mapping,
        trees,
        region,
        resume,
        input_hash,
    })
}
