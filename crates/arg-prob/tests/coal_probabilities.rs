mod common;

use arg_prob::{
    calc_log_coal_prob, calc_log_spr_prob, calc_tree_prior, spr_lineages, CoalCounts,
};
use arg_tree::{LineageCounts, LocalTree, Spr};
use common::{all_visible_sprs, balanced_four, model, random_tree, NTIMES};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn total_spr_prob(tree: &LocalTree) -> f64 {
    let model = model();
    let treelen = tree.treelen(model.times());
    all_visible_sprs(tree, NTIMES)
        .iter()
        .map(|spr| {
            let lineages = spr_lineages(tree, spr, NTIMES);
            calc_log_spr_prob(&model, tree, spr, &lineages, treelen, None).exp()
        })
        .sum()
}

#[test]
fn spr_probabilities_sum_to_one() {
    let total = total_spr_prob(&balanced_four());
    assert!((total - 1.0).abs() < 1e-9, "total = {total}");
}

#[test]
fn coalescence_windows_partition_time() {
    let model = model();
    let lineages = LineageCounts::count(&balanced_four(), NTIMES);
    for start in 0..NTIMES {
        let total: f64 = (start..NTIMES)
            .map(|c| calc_log_coal_prob(&model, &lineages, start, c, None).exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-9, "start {start}: {total}");
    }
    assert_eq!(
        calc_log_coal_prob(&model, &lineages, 5, 4, None),
        f64::NEG_INFINITY
    );
}

#[test]
fn larger_populations_delay_coalescence() {
    let small = model();
    let mut large = model();
    large.set_popsizes(vec![1e6; small.time().nsteps()]).unwrap();
    let lineages = LineageCounts::count(&balanced_four(), NTIMES);
    let early_small = calc_log_coal_prob(&small, &lineages, 0, 1, None);
    let early_large = calc_log_coal_prob(&large, &lineages, 0, 1, None);
    assert!(early_large < early_small);
}

#[test]
fn single_leaf_prior_is_zero() {
    let model = model();
    assert_eq!(calc_tree_prior(&model, &LocalTree::single_leaf(), None), 0.0);
}

#[test]
fn tree_prior_counts_every_coalescence() {
    let model = model();
    let mut counts = CoalCounts::new(model.time().nsteps());
    let lnp = calc_tree_prior(&model, &balanced_four(), Some(&mut counts));
    assert!(lnp.is_finite());
    assert_eq!(counts.total_coal(), 3.0);
    assert_eq!(counts.coal[3], 1.0);
    assert_eq!(counts.coal[5], 1.0);
    assert_eq!(counts.coal[11], 1.0);
    // six pairs among four leaves until the first coalescence
    assert_eq!(counts.nocoal[0], 6.0);
    assert_eq!(counts.nocoal[3], 6.0);
    assert_eq!(counts.nocoal[4], 3.0);
    assert_eq!(counts.nocoal[6], 1.0);
    assert_eq!(counts.nocoal[12], 0.0);
}

#[test]
fn tree_prior_is_deterministic() {
    let model = model();
    let tree = balanced_four();
    assert_eq!(
        calc_tree_prior(&model, &tree, None).to_bits(),
        calc_tree_prior(&model, &tree, None).to_bits()
    );
}

#[test]
fn spr_prob_records_exposure_and_event() {
    let model = model();
    let tree = balanced_four();
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 0,
        coal_node: 2,
        coal_time: 2,
    };
    let lineages = spr_lineages(&tree, &spr, NTIMES);
    let mut counts = CoalCounts::new(model.time().nsteps());
    let treelen = tree.treelen(model.times());
    let lnp = calc_log_spr_prob(&model, &tree, &spr, &lineages, treelen, Some(&mut counts));
    assert!(lnp.is_finite() && lnp < 0.0);
    assert_eq!(counts.total_coal(), 1.0);
    assert_eq!(counts.coal[3], 1.0);
    // three broken-tree branches below the coalescence window
    assert_eq!(&counts.nocoal[..4], &[3.0, 3.0, 3.0, 0.0]);
}

#[test]
fn zero_tree_length_is_impossible() {
    let model = model();
    let tree = balanced_four();
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 0,
        coal_node: 2,
        coal_time: 2,
    };
    let lineages = spr_lineages(&tree, &spr, NTIMES);
    assert_eq!(
        calc_log_spr_prob(&model, &tree, &spr, &lineages, 0.0, None),
        f64::NEG_INFINITY
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_trees_have_normalized_spr_distributions(seed in any::<u64>(), nleaves in 2usize..7) {
        let mut rng = StdRng::seed_from_u64(seed);
        let tree = random_tree(nleaves, NTIMES, &mut rng);
        let total = total_spr_prob(&tree);
        prop_assert!((total - 1.0).abs() < 1e-9, "total = {}", total);
    }
}
