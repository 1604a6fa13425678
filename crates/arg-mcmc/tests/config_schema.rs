use std::path::PathBuf;

use arg_core::{ArgError, Region};
use arg_mcmc::{PopsizeMethod, SamplerConfig};

#[test]
fn defaults_match_documented_values() {
    let config = SamplerConfig::default();
    assert_eq!(config.model.ntimes, 20);
    assert_eq!(config.model.maxtime, 200e3);
    assert_eq!(config.model.popsize, 1e4);
    assert_eq!(config.model.mutrate, 2.5e-8);
    assert_eq!(config.model.recombrate, 1.5e-8);
    assert_eq!(config.search.climb, 50);
    assert_eq!(config.search.iters, 1000);
    assert_eq!(config.search.prob_path_switch, 0.1);
    assert_eq!(config.search.sample_step, 10);
    assert_eq!(config.input.compress_seq, 1);
    assert_eq!(config.logging.verbose, 1);
    assert_eq!(config.heat, 1.0);
    assert!(config.output.write_manifest);
}

#[test]
fn yaml_overrides_and_defaults_combine() {
    let yaml = r#"
input:
  fasta: data/aln.fa
  compress_seq: 5
model:
  ntimes: 10
  popsize: 20000
search:
  iters: 50
  resample_region: { start: 100, end: 400 }
popsize_estimation:
  every: 5
  method: hmc
seed: 7
"#;
    let config = SamplerConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.input.fasta, Some(PathBuf::from("data/aln.fa")));
    assert_eq!(config.input.compress_seq, 5);
    assert_eq!(config.input.chrom, "chr");
    assert_eq!(config.model.ntimes, 10);
    assert_eq!(config.model.popsize, 20000.0);
    assert_eq!(config.model.maxtime, 200e3);
    assert_eq!(config.search.iters, 50);
    assert_eq!(config.search.climb, 50);
    assert_eq!(
        config.search.resample_region,
        Some(Region::new(100, 400).unwrap())
    );
    assert_eq!(config.popsize_estimation.every, 5);
    assert_eq!(config.popsize_estimation.method, PopsizeMethod::Hmc);
    assert_eq!(config.seed, 7);
    config.validate().unwrap();
}

#[test]
fn malformed_yaml_is_a_serde_error() {
    let err = SamplerConfig::from_yaml_str("search: [1, 2").unwrap_err();
    assert!(matches!(err, ArgError::Serde(_)));
    assert_eq!(err.info().code, "config-parse");
}

fn with_fasta() -> SamplerConfig {
    let mut config = SamplerConfig::default();
    config.input.fasta = Some(PathBuf::from("aln.fa"));
    config
}

#[test]
fn missing_input_is_rejected_with_hint() {
    let err = SamplerConfig::default().validate().unwrap_err();
    assert_eq!(err.info().code, "input-missing");
    assert!(err.info().hint.is_some());
}

fn assert_rejected(code: &str, mutate: impl Fn(&mut SamplerConfig)) {
    let mut config = with_fasta();
    mutate(&mut config);
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ArgError::Config(_)), "{code}");
    assert_eq!(err.info().code, code);
}

#[test]
fn inconsistent_settings_are_rejected() {
    assert_rejected("input-conflict", |c| {
        c.input.sites = Some(PathBuf::from("aln.sites"))
    });
    assert_rejected("compress-factor", |c| c.input.compress_seq = 0);
    assert_rejected("sample-step", |c| c.search.sample_step = 0);
    assert_rejected("path-switch", |c| c.search.prob_path_switch = 1.5);
    assert_rejected("recomb-preference", |c| c.moves.recomb_preference = 1.0);
    assert_rejected("shift-fraction", |c| c.moves.shift_fraction = -0.1);
    assert_rejected("segment-length", |c| c.moves.mean_segment_length = 0.0);
    assert_rejected("heat", |c| c.heat = 0.0);
    assert_rejected("resume-region", |c| {
        c.search.resume = true;
        c.search.resample_region = Some(Region::new(0, 10).unwrap());
    });
    assert_rejected("popsize-bounds", |c| {
        c.popsize_estimation.every = 1;
        c.popsize_estimation.min = 0.0;
    });
}

#[test]
fn config_file_errors_carry_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "model: {ntimes: many}").unwrap();
    let err = SamplerConfig::load(&path).unwrap_err();
    assert_eq!(err.info().code, "config-parse");
    assert!(err.info().context.contains_key("path"));

    let missing = SamplerConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
    assert!(matches!(missing, ArgError::Io(_)));
}
