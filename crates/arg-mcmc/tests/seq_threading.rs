mod common;

use arg_core::{ArgError, RngHandle};
use arg_mcmc::seq_sample::{add_sequence, sample_arg_seq, seed_trees};
use arg_model::{ArgModel, TimeModel};
use arg_tree::{canonical_hash, Sequences};

use common::{fasta_text, SEQLEN};

fn model() -> ArgModel {
    let time = TimeModel::log_spaced(200e3, 12).unwrap();
    ArgModel::new(time, 1e4, 2.5e-8, 1.5e-8).unwrap()
}

#[test]
fn every_sequence_is_threaded_in_order() {
    let model = model();
    let seqs = Sequences::read_fasta(&fasta_text(1)).unwrap();
    let start = seed_trees("chr", 0, SEQLEN).unwrap();
    assert_eq!(start.nleaves(), 1);
    assert_eq!(start.seqids(), &[0]);

    let trees = sample_arg_seq(&model, &seqs, start.clone(), 42).unwrap();
    assert_eq!(trees.nleaves(), 4);
    assert_eq!(trees.seqids(), &[0, 1, 2, 3]);
    assert_eq!((trees.start(), trees.end()), (0, SEQLEN));
    trees.validate(model.ntimes()).unwrap();

    let again = sample_arg_seq(&model, &seqs, start, 42).unwrap();
    assert_eq!(canonical_hash(&trees), canonical_hash(&again));
}

#[test]
fn complete_args_are_returned_unchanged() {
    let model = model();
    let seqs = Sequences::read_fasta(&fasta_text(2)).unwrap();
    let start = seed_trees("chr", 0, SEQLEN).unwrap();
    let full = sample_arg_seq(&model, &seqs, start, 3).unwrap();
    let same = sample_arg_seq(&model, &seqs, full.clone(), 99).unwrap();
    assert_eq!(canonical_hash(&full), canonical_hash(&same));
}

#[test]
fn threading_adds_one_leaf() {
    let model = model();
    let seqs = Sequences::read_fasta(&fasta_text(5)).unwrap();
    let start = seed_trees("chr", 0, SEQLEN).unwrap();
    let mut rng = RngHandle::from_seed(17);
    let two = add_sequence(&model, &seqs, &start, 1, &mut rng).unwrap();
    assert_eq!(two.nleaves(), 2);
    assert_eq!(two.seqids(), &[0, 1]);
    two.validate(model.ntimes()).unwrap();
}

#[test]
fn seed_tree_rejects_an_empty_span() {
    let err = seed_trees("chr", 10, 10).unwrap_err();
    assert!(matches!(err, ArgError::Structure(_) | ArgError::Config(_)));
}

#[test]
fn threaded_lineages_recombine_within_a_tree() {
    let time = TimeModel::log_spaced(200e3, 12).unwrap();
    let hot = ArgModel::new(time, 1e4, 2.5e-8, 2e-6).unwrap();
    let seqs = Sequences::read_fasta(&fasta_text(4)).unwrap();
    let start = seed_trees("chr", 0, SEQLEN).unwrap();
    let mut most = 0;
    for seed in 0..4 {
        let trees = sample_arg_seq(&hot, &seqs, start.clone(), seed).unwrap();
        trees.validate(hot.ntimes()).unwrap();
        assert_eq!(trees.nleaves(), 4);
        let again = sample_arg_seq(&hot, &seqs, start.clone(), seed).unwrap();
        assert_eq!(canonical_hash(&trees), canonical_hash(&again));
        most = most.max(trees.len());
    }
    assert!(most > 1, "no threading produced a breakpoint");
}
