use arg_core::{ArgError, RngHandle};
use arg_model::{ArgModel, PopsizeConfig, TimeModel};

#[test]
fn per_step_layout_names_each_half_step() {
    let config = PopsizeConfig::per_step(5);
    assert_eq!(config.params.len(), 5);
    assert_eq!(config.params[3].name, "N3");
    assert_eq!(config.prior_alpha, 1.0);
    assert_eq!(config.prior_beta, 1e-4);
    config.check_covers(5).unwrap();
}

#[test]
fn parse_groups_steps_and_sets_sizes() {
    let text = "A\t5000\t1\nA\t5000\t1\nB\t20000\t0\n";
    let mut popsizes = vec![1e4; 3];
    let config = PopsizeConfig::parse(text, 3, &mut popsizes).unwrap();
    assert_eq!(config.params.len(), 2);
    assert_eq!(config.params[0].steps.len(), 2);
    assert!(!config.params[1].sample);
    assert_eq!(popsizes, vec![5000.0, 5000.0, 20000.0]);
}

#[test]
fn parse_checks_line_count() {
    let mut popsizes = vec![1e4; 3];
    assert!(PopsizeConfig::parse("A\nB\n", 3, &mut popsizes).is_err());
    assert!(PopsizeConfig::parse("A\nB\nC\nD\n", 3, &mut popsizes).is_err());
}

#[test]
fn conflicting_sample_flags_are_rejected() {
    let mut popsizes = vec![1e4; 2];
    let err = PopsizeConfig::parse("A\t1000\t1\nA\t1000\t0\n", 2, &mut popsizes).unwrap_err();
    assert!(matches!(err, ArgError::Config(ref info) if info.code == "popsize-sample-conflict"));
}

#[test]
fn split_creates_one_parameter_per_step() {
    let mut popsizes = vec![1e4; 3];
    let mut config = PopsizeConfig::parse("A\nA\nB\n", 3, &mut popsizes).unwrap();
    config.split();
    assert_eq!(config.params.len(), 3);
    config.check_covers(3).unwrap();
}

#[test]
fn random_popsizes_respect_groups_and_bounds() {
    let time = TimeModel::linear(10.0, 3).unwrap();
    let mut model = ArgModel::new(time, 1e4, 1e-8, 1e-8).unwrap();
    let mut popsizes = vec![1e4; 5];
    let text = "A\nA\nA\nB\t7000\t0\nB\t7000\t0\n";
    let config = PopsizeConfig::parse(text, 5, &mut popsizes).unwrap();
    model.set_popsizes(popsizes).unwrap();
    model.set_popsize_config(config).unwrap();
    let mut rng = RngHandle::from_seed(11);
    model.set_popsizes_random(100.0, 500.0, &mut rng).unwrap();
    let sizes = model.popsizes();
    assert!(sizes[0] >= 100.0 && sizes[0] <= 500.0);
    assert_eq!(sizes[0], sizes[1]);
    assert_eq!(sizes[1], sizes[2]);
    assert_eq!(sizes[3], 7000.0);
}
