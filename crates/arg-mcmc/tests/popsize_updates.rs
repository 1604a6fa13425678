use arg_core::RngHandle;
use arg_mcmc::config::PopsizeEstimationConfig;
use arg_mcmc::popsize::{group_stats, hmc, mle, GroupStats};
use arg_mcmc::{PopsizeEstimator, PopsizeMethod};
use arg_model::{ArgModel, TimeModel};
use arg_prob::calc_arg_prior_counts;
use arg_tree::{LocalTree, LocalTrees};

fn model() -> ArgModel {
    let time = TimeModel::log_spaced(200e3, 10).unwrap();
    ArgModel::new(time, 1e4, 2.5e-8, 1.5e-8).unwrap()
}

fn four_leaf_arg() -> LocalTrees {
    let tree = LocalTree::from_parents(
        &[Some(4), Some(4), Some(5), Some(5), Some(6), Some(6), None],
        &[0, 0, 0, 0, 2, 3, 6],
    )
    .unwrap();
    LocalTrees::from_tree("chr", 0, 1000, tree, vec![0, 1, 2, 3]).unwrap()
}

fn group(coal: f64, exposure: f64) -> GroupStats {
    GroupStats {
        param: 0,
        coal,
        exposure,
    }
}

#[test]
fn mle_is_exposure_over_twice_the_coalescences() {
    let stats = [group(4.0, 8e4), group(0.0, 1e3), group(2.0, 0.0)];
    let estimates = mle(&stats, &[1.0, 5e3, 7e3]);
    assert_eq!(estimates, vec![1e4, 5e3, 7e3]);
}

#[test]
fn hmc_is_deterministic_and_positive() {
    let stats = [group(3.0, 6e4), group(1.0, 4e4)];
    let config = PopsizeEstimationConfig::default();
    let current = [1e4, 1e4];
    let mut a = RngHandle::from_seed(8);
    let mut b = RngHandle::from_seed(8);
    let first = hmc(&stats, &current, (1.0, 1e-4), &config, &mut a);
    let second = hmc(&stats, &current, (1.0, 1e-4), &config, &mut b);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|n| *n > 0.0 && n.is_finite()));
}

#[test]
fn group_stats_cover_every_sampled_step() {
    let model = model();
    let trees = four_leaf_arg();
    let counts = calc_arg_prior_counts(&model, &trees);
    let stats = group_stats(&model, &counts);
    assert_eq!(stats.len(), model.popsize_config().params.len());
    let total: f64 = stats.iter().map(|g| g.coal).sum();
    let expected: f64 = counts.coal.iter().sum();
    assert!((total - expected).abs() < 1e-9);
    assert!(stats.iter().all(|g| g.exposure >= 0.0));
}

#[test]
fn updates_respect_bounds_and_schedule() {
    let mut model = model();
    let trees = four_leaf_arg();
    let config = PopsizeEstimationConfig {
        every: 3,
        method: PopsizeMethod::Mle,
        min: 500.0,
        max: 2e4,
        ..PopsizeEstimationConfig::default()
    };
    let estimator = PopsizeEstimator::new(config);
    assert!(!estimator.due(0));
    assert!(estimator.due(2));
    assert!(estimator.due(5));

    let mut rng = RngHandle::from_seed(1);
    estimator.update(&mut model, &trees, &mut rng).unwrap();
    assert!(model
        .popsizes()
        .iter()
        .all(|&n| (500.0..=2e4).contains(&n)));
}
