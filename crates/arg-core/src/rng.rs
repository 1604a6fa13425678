//! Seeded random streams for the sampler.
//!
//! Every stage and iteration of a run draws from its own stream. A stream
//! seed is the SipHash-1-3 digest (zero keys) of the master seed and a
//! stream identifier, so streams are stable across platforms and a resumed
//! run replays the draws an uninterrupted run would have made.

use std::hash::Hasher;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use siphasher::sip::SipHasher13;

/// Seed of stream `substream` under `master_seed`.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}

/// Random stream handed to proposals, threading and population updates.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Stream seeded directly with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Draws an index with probability proportional to `exp(log_weights[i])`.
///
/// Returns `None` when every weight is `-inf` or the slice is empty.
pub fn sample_log_weights(log_weights: &[f64], rng: &mut RngHandle) -> Option<usize> {
    let max = log_weights
        .iter()
        .copied()
        .filter(|w| !w.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let total: f64 = log_weights
        .iter()
        .map(|&w| if w.is_nan() { 0.0 } else { (w - max).exp() })
        .sum();
    let mut target = rng.uniform() * total;
    let mut last = None;
    for (idx, &w) in log_weights.iter().enumerate() {
        if w.is_nan() || w == f64::NEG_INFINITY {
            continue;
        }
        let weight = (w - max).exp();
        last = Some(idx);
        if target < weight {
            return Some(idx);
        }
        target -= weight;
    }
    last
}
