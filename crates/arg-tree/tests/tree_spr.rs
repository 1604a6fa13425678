mod common;

use arg_tree::spr::{check_link, match_nodes};
use arg_tree::{apply_spr, find_spr, link_trees, same_tree, LeafSet, LineageCounts, LocalTree, Spr};
use common::{balanced_four, crossed_four, random_spr, random_tree, NTIMES};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn from_parents_rejects_malformed_shapes() {
    let two_roots = LocalTree::from_parents(&[Some(2), None, None], &[0, 0, 1]);
    assert!(two_roots.is_err());
    let old_child = LocalTree::from_parents(&[Some(2), Some(2), None], &[0, 4, 1]);
    assert_eq!(old_child.unwrap_err().info().code, "tree-age-order");
    let internal_leaf = LocalTree::from_parents(&[None, Some(0), Some(0)], &[3, 0, 0]);
    assert_eq!(internal_leaf.unwrap_err().info().code, "tree-leaf-layout");
}

#[test]
fn tree_queries_follow_structure() {
    let tree = balanced_four();
    assert_eq!(tree.root(), 6);
    assert_eq!(tree.sibling(0), Some(1));
    assert_eq!(tree.sibling(6), None);
    assert!(tree.is_descendant(2, 5));
    assert!(!tree.is_descendant(2, 4));
    let times: Vec<f64> = (0..NTIMES).map(|i| i as f64 * 10.0).collect();
    // branches: 4 leaves (20, 20, 30, 30) + internal (40, 30)
    assert_eq!(tree.treelen(&times), 170.0);
    let sets = tree.leafsets();
    assert_eq!(sets[4].iter().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(sets[6].len(), 4);
    assert!(tree.check(NTIMES).is_ok());
    assert_eq!(tree.check(6).unwrap_err().info().code, "tree-age-range");
}

#[test]
fn apply_spr_reuses_the_broken_node() {
    let tree = balanced_four();
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 1,
        coal_node: 2,
        coal_time: 2,
    };
    let next = apply_spr(&tree, &spr, NTIMES).unwrap();
    next.check(NTIMES).unwrap();
    assert_eq!(next.parent(1), Some(6));
    assert_eq!(next.children(4), Some([0, 2]));
    assert_eq!(next.parent(4), Some(5));
    assert_eq!(next.age(4), 2);
    let mut clade = LeafSet::empty(4);
    clade.insert(0);
    clade.insert(2);
    assert_eq!(next.leafsets()[4], clade);
}

#[test]
fn invalid_sprs_are_rejected() {
    let tree = balanced_four();
    let into_subtree = Spr {
        recomb_node: 4,
        recomb_time: 2,
        coal_node: 0,
        coal_time: 4,
    };
    assert_eq!(
        apply_spr(&tree, &into_subtree, NTIMES).unwrap_err().info().code,
        "spr-coal-subtree"
    );
    let above_branch = Spr {
        recomb_node: 0,
        recomb_time: 0,
        coal_node: 2,
        coal_time: 5,
    };
    assert_eq!(
        apply_spr(&tree, &above_branch, NTIMES).unwrap_err().info().code,
        "spr-coal-time"
    );
    let root = Spr {
        recomb_node: 6,
        recomb_time: 6,
        coal_node: 0,
        coal_time: 7,
    };
    assert!(apply_spr(&tree, &root, NTIMES).is_err());
}

#[test]
fn find_spr_links_single_moves_only() {
    let tree = balanced_four();
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 1,
        coal_node: 2,
        coal_time: 2,
    };
    let next = apply_spr(&tree, &spr, NTIMES).unwrap();
    let (found, mapping) = find_spr(&tree, &next, NTIMES).unwrap();
    assert!(same_tree(&apply_spr(&tree, &found, NTIMES).unwrap(), &next));
    check_link(&tree, &found, &mapping, &next, NTIMES).unwrap();
    assert_eq!(mapping[4], None);
    assert_eq!(mapping[0], Some(0));

    assert!(find_spr(&tree, &tree, NTIMES).is_none());
    assert!(find_spr(&tree, &crossed_four(), NTIMES).is_none());
}

#[test]
fn match_nodes_ignores_internal_labels() {
    let tree = balanced_four();
    let relabelled = LocalTree::from_parents(
        &[Some(5), Some(5), Some(4), Some(4), Some(6), Some(6), None],
        &[0, 0, 0, 0, 3, 2, 6],
    )
    .unwrap();
    assert!(same_tree(&tree, &relabelled));
    assert_eq!(
        match_nodes(&tree, &relabelled).unwrap(),
        vec![0, 1, 2, 3, 5, 4, 6]
    );
}

#[test]
fn new_leaf_joins_the_target_branch() {
    let tree = balanced_four();
    let grown = tree.with_new_leaf(5, 4).unwrap();
    grown.check(NTIMES).unwrap();
    assert_eq!(grown.nleaves(), 5);
    assert_eq!(grown.nnodes(), 9);
    let joined = grown.parent(4).unwrap();
    assert_eq!(joined, 8);
    assert_eq!(grown.age(joined), 4);
    // old node 5 is relabelled 6
    assert_eq!(grown.children(joined).map(|c| c.contains(&6)), Some(true));
    assert!(tree.with_new_leaf(5, 7).is_err());
}

#[test]
fn lineage_counts_cover_the_tree() {
    let tree = balanced_four();
    let counts = LineageCounts::count(&tree, NTIMES);
    assert_eq!(counts.nbranches.len(), 2 * NTIMES - 1);
    assert_eq!(counts.nbranches[0], 4);
    assert_eq!(counts.nbranches[4], 3);
    assert_eq!(counts.nbranches[6], 2);
    assert_eq!(counts.nbranches[12], 1);
    assert_eq!(counts.nbranches[2 * NTIMES - 2], 1);
    assert_eq!(counts.ncoals[0], 4);
    assert_eq!(counts.ncoals[2], 5);
    assert_eq!(counts.ncoals[6], 3);
    assert_eq!(counts.nrecombs[6], 0);

    let broken = LineageCounts::count_broken(&tree, 0, NTIMES);
    assert_eq!(broken.nbranches[0], 3);
    assert_eq!(broken.ncoals[2], 3);
    assert_eq!(broken.ncoals[6], 3);
    assert_eq!(broken.ncoals[7], 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_sprs_keep_trees_valid_and_linkable(seed in any::<u64>(), nleaves in 2usize..9) {
        let mut rng = StdRng::seed_from_u64(seed);
        let tree = random_tree(nleaves, NTIMES, &mut rng);
        for _ in 0..20 {
            let Some(spr) = random_spr(&tree, NTIMES, &mut rng) else { continue };
            let next = apply_spr(&tree, &spr, NTIMES).unwrap();
            prop_assert!(next.check(NTIMES).is_ok());
            prop_assert!(link_trees(&tree, &spr, &next, NTIMES).is_some());
            if same_tree(&tree, &next) {
                continue;
            }
            let (found, mapping) = find_spr(&tree, &next, NTIMES).unwrap();
            prop_assert!(check_link(&tree, &found, &mapping, &next, NTIMES).is_ok());
        }
    }
}
