mod common;

use arg_core::{ArgError, Region};
use arg_mcmc::setup::build_time_model;
use arg_mcmc::stats::read_rows;
use arg_mcmc::{run_sampler, run_sampler_with_stop, RunManifest, StopHandle};
use arg_tree::load_arg;

use common::{small_config, SEQLEN};

#[test]
fn stages_log_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let summary = run_sampler(&config).unwrap();

    let rows = read_rows(&summary.stats_path).unwrap();
    assert_eq!(rows.len(), 1 + 5 + 10);
    assert_eq!(rows[0].stage, "seq");
    assert_eq!(rows[0].iter, 4);
    for (k, row) in rows[1..6].iter().enumerate() {
        assert_eq!(row.stage, "climb");
        assert_eq!(row.iter, k);
    }
    for (k, row) in rows[6..].iter().enumerate() {
        assert_eq!(row.stage, "resample");
        assert_eq!(row.iter, k);
        assert!(row.joint.is_finite());
        assert!((row.prior + row.likelihood - row.joint).abs() < 1e-6);
    }
    assert_eq!(rows.last().unwrap().recombs, summary.recombs);

    let prefix = dir.path().join("out");
    let expected: Vec<_> = [0, 5, 9]
        .iter()
        .map(|iter| prefix.join(format!("run.{iter}.smc.gz")))
        .collect();
    assert_eq!(summary.args, expected);
    assert!(expected.iter().all(|path| path.exists()));
    assert!(prefix.join("run.log").exists());
    assert!(!summary.interrupted);
}

#[test]
fn written_args_cover_the_alignment() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.output.check_invariants = true;
    config.output.no_compress_output = true;
    let summary = run_sampler(&config).unwrap();

    let time = build_time_model(&config.model).unwrap();
    let last = summary.args.last().unwrap();
    assert_eq!(last.extension().unwrap(), "smc");
    let (trees, names) = load_arg(last, &time).unwrap();
    assert_eq!(names, vec!["n1", "n2", "n3", "n4"]);
    assert_eq!(trees.nleaves(), 4);
    assert_eq!(trees.start(), 0);
    assert_eq!(trees.end(), SEQLEN);
    assert_eq!(trees.num_recombinations(), summary.recombs);
    trees.validate(time.ntimes()).unwrap();
}

#[test]
fn same_seed_reproduces_the_run() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = run_sampler(&small_config(first.path())).unwrap();
    let b = run_sampler(&small_config(second.path())).unwrap();

    assert_eq!(a.arg_hash, b.arg_hash);
    assert_eq!(a.final_score, b.final_score);
    assert_eq!(a.acceptance_rates, b.acceptance_rates);
    assert_eq!(
        read_rows(&a.stats_path).unwrap(),
        read_rows(&b.stats_path).unwrap()
    );
}

#[test]
fn manifest_records_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let summary = run_sampler(&config).unwrap();

    let path = summary.manifest_path.clone().unwrap();
    let manifest = RunManifest::load(&path).unwrap();
    assert_eq!(manifest.config, config);
    assert_eq!(manifest.provenance.seed, config.seed);
    assert_eq!(manifest.provenance.arg_hash, summary.arg_hash);
    assert_eq!(manifest.provenance.input_hash.len(), 64);
    assert_eq!(manifest.args, summary.args);
    assert_eq!(manifest.stats_file, summary.stats_path);
    assert!(!manifest.interrupted);
    assert!(manifest.acceptance_rates.contains_key("regraft"));
}

#[test]
fn stop_request_ends_after_the_current_stage_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let stop = StopHandle::new();
    stop.request_stop();
    let summary = run_sampler_with_stop(&config, stop).unwrap();

    assert!(summary.interrupted);
    let rows = read_rows(&summary.stats_path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stage, "seq");
    let written = dir.path().join("out").join("run.seq.4.smc.gz");
    assert_eq!(summary.args, vec![written.clone()]);
    assert!(written.exists());
    let manifest = RunManifest::load(&summary.manifest_path.unwrap()).unwrap();
    assert!(manifest.interrupted);
}

#[test]
fn region_outside_the_alignment_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.search.resample_region = Some(Region::new(900, 1200).unwrap());
    let err = run_sampler(&config).unwrap_err();
    assert!(matches!(err, ArgError::Config(_)));
    assert_eq!(err.info().code, "region-outside");
}

#[test]
fn compressed_runs_write_original_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.input.compress_seq = 10;
    let summary = run_sampler(&config).unwrap();

    let time = build_time_model(&config.model).unwrap();
    let (trees, _) = load_arg(summary.args.last().unwrap(), &time).unwrap();
    assert_eq!(trees.start(), 0);
    assert_eq!(trees.end(), SEQLEN);
    assert_eq!(trees.nleaves(), 4);
}

#[test]
fn default_stage_lengths_log_one_row_per_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.model.ntimes = 20;
    config.search.climb = 50;
    config.search.iters = 100;
    config.search.sample_step = 10;
    config.moves.moves_per_iteration = 1;
    config.output.write_manifest = false;
    let summary = run_sampler(&config).unwrap();

    let rows = read_rows(&summary.stats_path).unwrap();
    let count = |stage: &str| rows.iter().filter(|row| row.stage == stage).count();
    assert_eq!((count("seq"), count("climb"), count("resample")), (1, 50, 100));
    assert_eq!(rows.len(), 151);
    assert_eq!(summary.args.len(), 11);
    assert_eq!(summary.nleaves, 4);
    assert!(summary.manifest_path.is_none());
}
