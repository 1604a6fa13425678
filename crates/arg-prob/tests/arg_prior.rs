mod common;

use arg_prob::{
    calc_arg_prior, calc_arg_prior_counts, calc_arg_prior_full, calc_log_spr_prob,
    calc_tree_prior, spr_lineages,
};
use arg_tree::{LocalTrees, Spr};
use common::{balanced_four, model, moved_four, three_blocks, NTIMES};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(1.0)
}

#[test]
fn prior_decomposes_over_blocks_and_breakpoints() {
    let model = model();
    let trees = three_blocks();
    let times = model.times();
    let rho = model.rho;
    let mut expected = calc_tree_prior(&model, &balanced_four(), None);
    for idx in 0..3 {
        let tree = &trees.blocks()[idx].tree;
        let treelen = tree.treelen(times);
        expected -= 99.0 * rho * treelen;
        if let Some(next) = trees.blocks().get(idx + 1) {
            let spr = next.spr.unwrap();
            let lineages = spr_lineages(tree, &spr, NTIMES);
            expected += (-(-rho * treelen).exp_m1()).ln();
            expected += calc_log_spr_prob(&model, tree, &spr, &lineages, treelen, None);
        }
    }
    let prior = calc_arg_prior(&model, &trees, 0, 300);
    assert!(close(prior, expected), "{prior} vs {expected}");
}

#[test]
fn adjacent_windows_add_up() {
    let model = model();
    let trees = three_blocks();
    let whole = calc_arg_prior(&model, &trees, 0, 300);
    for mid in [1, 50, 100, 101, 150, 200, 299] {
        let split =
            calc_arg_prior(&model, &trees, 0, mid) + calc_arg_prior(&model, &trees, mid, 300);
        assert!(close(whole, split), "mid {mid}: {whole} vs {split}");
    }
}

#[test]
fn windows_outside_the_arg_are_empty() {
    let model = model();
    let trees = three_blocks();
    assert_eq!(calc_arg_prior(&model, &trees, 300, 400), 0.0);
    assert_eq!(calc_arg_prior(&model, &trees, 50, 50), 0.0);
    assert_eq!(
        calc_arg_prior(&model, &trees, 0, 1),
        calc_tree_prior(&model, &balanced_four(), None)
    );
}

#[test]
fn more_recombination_costs_more_without_breakpoints() {
    let trees =
        LocalTrees::from_tree("chr1", 0, 1000, balanced_four(), vec![0, 1, 2, 3]).unwrap();
    let low = model();
    let mut high = model();
    high.rho *= 10.0;
    assert!(calc_arg_prior(&high, &trees, 0, 1000) < calc_arg_prior(&low, &trees, 0, 1000));
}

#[test]
fn invisible_recombinations_replace_the_quiet_transition() {
    let model = model();
    let trees = three_blocks();
    let tree = balanced_four();
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 0,
        coal_node: 0,
        coal_time: 1,
    };
    let plain = calc_arg_prior(&model, &trees, 0, 300);
    let with = calc_arg_prior_full(&model, &trees, 0, 300, None, &[(50, spr)]);
    let treelen = tree.treelen(model.times());
    let rho = model.rho_at(50);
    let lineages = spr_lineages(&tree, &spr, NTIMES);
    let delta = rho * treelen
        + (-(-rho * treelen).exp_m1()).ln()
        + calc_log_spr_prob(&model, &tree, &spr, &lineages, treelen, None);
    assert!(close(with - plain, delta));

    let ignored =
        calc_arg_prior_full(&model, &trees, 0, 300, None, &[(100, spr), (400, spr)]);
    assert_eq!(ignored, plain);
}

#[test]
fn counts_cover_first_tree_and_every_breakpoint() {
    let model = model();
    let counts = calc_arg_prior_counts(&model, &three_blocks());
    assert_eq!(counts.nsteps(), 2 * NTIMES - 1);
    assert_eq!(counts.total_coal(), 3.0 + 2.0);
    assert!(counts.nocoal.iter().all(|&n| n >= 0.0));
}

#[test]
fn prior_is_a_pure_function() {
    let model = model();
    let trees = three_blocks();
    let first = calc_arg_prior(&model, &trees, 0, 300);
    let second = calc_arg_prior(&model, &trees.clone(), 0, 300);
    assert_eq!(first.to_bits(), second.to_bits());
    assert_ne!(moved_four(), balanced_four());
}
