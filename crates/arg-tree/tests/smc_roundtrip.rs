mod common;

use std::fs;

use arg_model::TimeModel;
use arg_tree::smc::{read_newick, write_newick};
use arg_tree::{apply_spr, canonical_hash, load_arg, store_arg, LocalTrees, Spr, TreeSegment};
use common::{balanced_four, NTIMES};
use tempfile::tempdir;

fn sample_trees() -> LocalTrees {
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 1,
        coal_node: 2,
        coal_time: 2,
    };
    let moved = apply_spr(&balanced_four(), &spr, NTIMES).unwrap();
    LocalTrees::from_segments(
        "chr7",
        vec![1, 0, 2, 3],
        vec![
            TreeSegment { start: 0, end: 40, tree: balanced_four() },
            TreeSegment { start: 40, end: 90, tree: moved },
        ],
        NTIMES,
    )
    .unwrap()
}

fn names() -> Vec<String> {
    ["n1", "n2", "n3", "n4"].iter().map(|s| s.to_string()).collect()
}

#[test]
fn newick_round_trips_labels_and_ages() {
    let time = TimeModel::log_spaced(200e3, NTIMES).unwrap();
    let tree = balanced_four();
    let text = write_newick(&tree, time.times());
    assert!(text.ends_with(';'));
    assert!(text.contains("[&&NHX:age=0]"));
    assert_eq!(read_newick(&text, &time).unwrap(), tree);
}

#[test]
fn smc_round_trips_plain_and_gzip() {
    let time = TimeModel::log_spaced(200e3, NTIMES).unwrap();
    let trees = sample_trees();
    let dir = tempdir().unwrap();
    for file in ["out.smc", "out.smc.gz"] {
        let path = dir.path().join(file);
        store_arg(&path, &trees, &names(), time.times()).unwrap();
        let (mut loaded, leaf_names) = load_arg(&path, &time).unwrap();
        assert_eq!(leaf_names, vec!["n2", "n1", "n3", "n4"]);
        loaded.map_seqids(&leaf_names, &names()).unwrap();
        assert_eq!(loaded, trees);
        assert_eq!(canonical_hash(&loaded), canonical_hash(&trees));
    }
    let raw = fs::read(dir.path().join("out.smc.gz")).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    let text = fs::read_to_string(dir.path().join("out.smc")).unwrap();
    assert!(text.starts_with("NAMES\tn2\tn1\tn3\tn4\nREGION\tchr7\t1\t90\n"));
    assert_eq!(text.lines().filter(|l| l.starts_with("SPR\t")).count(), 1);
}

#[test]
fn missing_arg_file_is_an_io_error() {
    let time = TimeModel::log_spaced(200e3, NTIMES).unwrap();
    let dir = tempdir().unwrap();
    let err = load_arg(&dir.path().join("absent.smc"), &time).unwrap_err();
    assert!(matches!(err, arg_core::ArgError::Io(_)));
    assert!(err.info().context.contains_key("path"));
}
