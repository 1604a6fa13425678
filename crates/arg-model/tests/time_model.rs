use arg_core::ArgError;
use arg_model::{get_delta, get_time_point, TimeModel, TimeSpacing};
use proptest::prelude::*;

fn check_grid(model: &TimeModel, ntimes: usize) {
    let times = model.times();
    assert_eq!(times.len(), ntimes);
    assert_eq!(times[0], 0.0);
    for pair in times.windows(2) {
        assert!(pair[1] > pair[0], "times not increasing: {pair:?}");
    }
    let steps = model.coal_time_steps();
    assert_eq!(steps.len(), 2 * ntimes - 1);
    assert_eq!(*steps.last().unwrap(), f64::INFINITY);
    for &step in &steps[..steps.len() - 1] {
        assert!(step >= 0.0 && step.is_finite());
    }
    for i in 0..ntimes - 1 {
        let whole = steps[2 * i] + steps[2 * i + 1];
        let interval = times[i + 1] - times[i];
        assert!((whole - interval).abs() <= 1e-6 * interval.max(1.0));
    }
}

#[test]
fn default_log_grid_matches_closed_form() {
    let model = TimeModel::log_spaced(200e3, 20).unwrap();
    check_grid(&model, 20);
    assert!((model.maxtime() - 200e3).abs() < 1e-6);
    let expected = get_time_point(1, 19, 200e3, 0.01);
    assert!((model.time(1) - expected).abs() < 1e-9);
    match model.spacing() {
        TimeSpacing::Log { delta, .. } => assert!((delta - 0.01).abs() < 1e-6),
        other => panic!("unexpected spacing {other:?}"),
    }
}

#[test]
fn delta_is_recovered_by_bisection() {
    let times: Vec<f64> = (0..12).map(|i| get_time_point(i, 11, 5e4, 0.05)).collect();
    let delta = get_delta(&times, 5e4).unwrap();
    assert!((delta - 0.05).abs() < 1e-6);
}

#[test]
fn non_bracketing_delta_is_a_config_error() {
    let err = TimeModel::log_spaced_with_delta(200e3, 20, 1e-6).unwrap_err();
    assert!(matches!(err, ArgError::Config(ref info) if info.code == "delta-bracket"));
}

#[test]
fn linear_grid_uses_midpoints() {
    let model = TimeModel::linear(100.0, 5).unwrap();
    check_grid(&model, 5);
    assert_eq!(model.coal_time_steps()[0], 50.0);
    assert_eq!(model.interval(4), 0.0);
    assert_eq!(model.index_of(300.0), Some(3));
    assert_eq!(model.index_of(310.0), None);
}

#[test]
fn explicit_times_must_increase() {
    assert!(TimeModel::from_times(vec![0.0, 10.0, 35.0]).is_ok());
    assert!(TimeModel::from_times(vec![0.0, 10.0, 10.0]).is_err());
    assert!(TimeModel::from_times(vec![1.0, 10.0]).is_err());
    assert!(TimeModel::linear(10.0, 1).is_err());
}

proptest! {
    #[test]
    fn log_grids_are_valid(ntimes in 3usize..40, maxtime in 1e3f64..1e6, delta in 0.001f64..1.0) {
        let model = TimeModel::log_spaced_with_delta(maxtime, ntimes, delta).unwrap();
        check_grid(&model, ntimes);
    }

    #[test]
    fn linear_grids_are_valid(ntimes in 2usize..40, step in 1.0f64..1e4) {
        let model = TimeModel::linear(step, ntimes).unwrap();
        check_grid(&model, ntimes);
    }
}
