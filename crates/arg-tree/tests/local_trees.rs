mod common;

use arg_tree::{apply_spr, link_trees, LocalTreeSpr, LocalTree, LocalTrees, Spr, TreeSegment};
use common::{balanced_four, crossed_four, NTIMES};

fn moved_four() -> LocalTree {
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 1,
        coal_node: 2,
        coal_time: 2,
    };
    apply_spr(&balanced_four(), &spr, NTIMES).unwrap()
}

fn segment(start: usize, end: usize, tree: LocalTree) -> TreeSegment {
    TreeSegment { start, end, tree }
}

fn three_blocks() -> LocalTrees {
    LocalTrees::from_segments(
        "chr1",
        vec![0, 1, 2, 3],
        vec![
            segment(0, 100, balanced_four()),
            segment(100, 200, moved_four()),
            segment(200, 300, balanced_four()),
        ],
        NTIMES,
    )
    .unwrap()
}

#[test]
fn built_sequence_is_valid_and_indexed() {
    let trees = three_blocks();
    trees.validate(NTIMES).unwrap();
    assert_eq!(trees.len(), 3);
    assert_eq!(trees.num_recombinations(), 2);
    assert_eq!((trees.start(), trees.end()), (0, 300));
    assert_eq!(trees.block_index(0), Some(0));
    assert_eq!(trees.block_index(150), Some(1));
    assert_eq!(trees.block_index(299), Some(2));
    assert_eq!(trees.block_index(300), None);
    assert_eq!(trees.blocks_overlapping(50, 150), 0..2);
    assert_eq!(trees.blocks_overlapping(100, 200), 1..2);
    assert!(trees.blocks()[0].spr.is_none());
    assert!(trees.blocks()[1].spr.is_some());
}

#[test]
fn equal_neighbours_merge_on_construction() {
    let trees = LocalTrees::from_segments(
        "chr1",
        vec![0, 1, 2, 3],
        vec![segment(0, 10, balanced_four()), segment(10, 20, balanced_four())],
        NTIMES,
    )
    .unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees.blocks()[0].end, 20);
}

#[test]
fn duplicate_seqids_are_rejected() {
    let err = LocalTrees::from_segments(
        "chr1",
        vec![0, 0, 1, 2],
        vec![segment(0, 10, balanced_four())],
        NTIMES,
    )
    .unwrap_err();
    assert_eq!(err.info().code, "trees-seqids");
}

#[test]
fn unlinkable_neighbours_are_rejected() {
    let err = LocalTrees::from_segments(
        "chr1",
        vec![0, 1, 2, 3],
        vec![segment(0, 10, balanced_four()), segment(10, 20, crossed_four())],
        NTIMES,
    )
    .unwrap_err();
    assert_eq!(err.info().code, "trees-unlinkable");
}

#[test]
fn splice_merges_and_undo_restores() {
    let mut trees = three_blocks();
    let before = trees.clone();
    let undo = trees
        .splice(1, 1, vec![segment(100, 200, balanced_four())], NTIMES)
        .unwrap()
        .unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees.blocks()[0].end, 300);
    trees.validate(NTIMES).unwrap();
    trees.undo(undo);
    assert_eq!(trees, before);
}

#[test]
fn splice_splits_a_block_and_relinks_the_next() {
    let mut trees = three_blocks();
    let before = trees.clone();
    let undo = trees
        .splice(
            0,
            0,
            vec![segment(0, 50, balanced_four()), segment(50, 100, moved_four())],
            NTIMES,
        )
        .unwrap()
        .unwrap();
    trees.validate(NTIMES).unwrap();
    assert_eq!(trees.len(), 3);
    assert_eq!(trees.blocks()[1].start, 50);
    assert_eq!(trees.blocks()[1].end, 200);
    trees.undo(undo);
    assert_eq!(trees, before);
}

/// `three_blocks` with the last breakpoint recombining above the bottom of
/// its branch, an event `find_spr` never proposes.
fn three_blocks_with_raised_recombination() -> LocalTrees {
    let raised = Spr {
        recomb_node: 0,
        recomb_time: 1,
        coal_node: 1,
        coal_time: 2,
    };
    let mut blocks = three_blocks().blocks().to_vec();
    assert_ne!(blocks[2].spr, Some(raised));
    blocks[2].mapping = Some(link_trees(&moved_four(), &raised, &balanced_four(), NTIMES).unwrap());
    blocks[2].spr = Some(raised);
    let trees = LocalTrees::from_blocks("chr1", 0, 300, vec![0, 1, 2, 3], blocks).unwrap();
    trees.validate(NTIMES).unwrap();
    trees
}

#[test]
fn splice_keeps_links_of_untouched_breakpoints() {
    let mut trees = three_blocks_with_raised_recombination();
    let before = trees.clone();
    let kept = before.blocks()[2].clone();
    let undo = trees
        .splice(
            0,
            0,
            vec![segment(0, 60, balanced_four()), segment(60, 100, moved_four())],
            NTIMES,
        )
        .unwrap()
        .unwrap();
    trees.validate(NTIMES).unwrap();
    assert_eq!(trees.len(), 3);
    assert_eq!(trees.blocks()[2], kept);
    assert_eq!(undo.relinked(), Some(60..101));
    trees.undo(undo);
    assert_eq!(trees, before);
}

#[test]
fn relabelled_neighbours_carry_their_event_over() {
    let mut trees = three_blocks_with_raised_recombination();
    let undo = trees
        .splice(1, 1, vec![segment(100, 200, balanced_four())], NTIMES)
        .unwrap()
        .unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(undo.relinked(), Some(100..201));

    let mut trees = three_blocks_with_raised_recombination();
    let unchanged = trees
        .splice(0, 1, vec![segment(0, 100, balanced_four()), segment(100, 200, moved_four())], NTIMES)
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.relinked(), None);
    assert_eq!(trees.blocks()[2].spr.unwrap().recomb_time, 1);
}

#[test]
fn unlinkable_splice_leaves_the_sequence_untouched() {
    let mut trees = three_blocks();
    let before = trees.clone();
    let outcome = trees
        .splice(1, 1, vec![segment(100, 200, crossed_four())], NTIMES)
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(trees, before);
}

#[test]
fn splice_requires_matching_coverage() {
    let mut trees = three_blocks();
    let err = trees
        .splice(1, 1, vec![segment(100, 150, balanced_four())], NTIMES)
        .unwrap_err();
    assert_eq!(err.info().code, "segments-layout");
}

#[test]
fn validate_reports_broken_layouts() {
    let first = LocalTreeSpr {
        start: 0,
        end: 100,
        tree: balanced_four(),
        spr: None,
        mapping: None,
    };
    let unlinked = LocalTreeSpr {
        start: 100,
        end: 200,
        tree: moved_four(),
        spr: None,
        mapping: None,
    };
    let trees =
        LocalTrees::from_blocks("chr1", 0, 200, vec![0, 1, 2, 3], vec![first.clone(), unlinked])
            .unwrap();
    assert_eq!(trees.validate(NTIMES).unwrap_err().info().code, "trees-missing-spr");

    let gapped = LocalTreeSpr {
        start: 101,
        end: 200,
        tree: moved_four(),
        spr: None,
        mapping: None,
    };
    let trees =
        LocalTrees::from_blocks("chr1", 0, 200, vec![0, 1, 2, 3], vec![first, gapped]).unwrap();
    assert_eq!(trees.validate(NTIMES).unwrap_err().info().code, "trees-gap");
}

#[test]
fn seqids_follow_names() {
    let mut trees = three_blocks();
    let leaf_names: Vec<String> = ["b", "a", "d", "c"].iter().map(|s| s.to_string()).collect();
    let seq_names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    trees.map_seqids(&leaf_names, &seq_names).unwrap();
    assert_eq!(trees.seqids(), &[1, 0, 3, 2]);
    let missing: Vec<String> = ["a", "b", "c", "x"].iter().map(|s| s.to_string()).collect();
    let err = trees.map_seqids(&missing, &seq_names).unwrap_err();
    assert_eq!(err.info().code, "arg-names-mismatch");
}
