use arg_core::rng::{derive_substream_seed, sample_log_weights, RngHandle};
use rand::RngCore;

#[test]
fn rng_emits_reproducible_sequence() {
    let mut rng_a = RngHandle::from_seed(1234);
    let mut rng_b = RngHandle::from_seed(1234);

    let seq_a: Vec<u64> = (0..100).map(|_| rng_a.next_u64()).collect();
    let seq_b: Vec<u64> = (0..100).map(|_| rng_b.next_u64()).collect();

    assert_eq!(seq_a, seq_b);
}

#[test]
fn substreams_differ_and_repeat() {
    assert_eq!(derive_substream_seed(7, 3), derive_substream_seed(7, 3));
    assert_ne!(derive_substream_seed(7, 3), derive_substream_seed(7, 4));
}

#[test]
fn log_weight_sampling_skips_impossible_entries() {
    let mut rng = RngHandle::from_seed(99);
    let weights = [f64::NEG_INFINITY, 0.0, f64::NEG_INFINITY];
    for _ in 0..50 {
        assert_eq!(sample_log_weights(&weights, &mut rng), Some(1));
    }
    assert_eq!(sample_log_weights(&[f64::NEG_INFINITY], &mut rng), None);
    assert_eq!(sample_log_weights(&[], &mut rng), None);
}

#[test]
fn log_weight_sampling_follows_weights() {
    let mut rng = RngHandle::from_seed(5);
    let weights = [0.0, (3.0f64).ln()];
    let hits = (0..4000)
        .filter(|_| sample_log_weights(&weights, &mut rng) == Some(1))
        .count();
    let frac = hits as f64 / 4000.0;
    assert!((frac - 0.75).abs() < 0.05, "fraction {frac}");
}

#[test]
fn uniform_draws_stay_below_one() {
    let mut rng = RngHandle::from_seed(77);
    for _ in 0..10_000 {
        let u = rng.uniform();
        assert!((0.0..1.0).contains(&u), "draw {u}");
    }
}
