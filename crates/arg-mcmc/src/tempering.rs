//! Coupling to peer chains run at other heats.
//!
//! The chain itself stays single-threaded. Peer coordination lives behind
//! [`ChainExchange`], which the driver consults at fixed iterations.

use arg_core::RngHandle;

/// Peer chain a state swap can be proposed to.
pub trait ChainExchange {
    /// Offers this chain's state at `iter` (heat `heat`, log joint `joint`)
    /// to a peer. Returns the peer's `(heat, joint)` when one is available.
    fn propose_swap(&mut self, iter: usize, heat: f64, joint: f64) -> Option<(f64, f64)>;

    /// Reports the outcome of the swap decided for `iter`.
    fn complete_swap(&mut self, iter: usize, accepted: bool);
}

/// Log acceptance of swapping states between chains at heats `heat_a` and
/// `heat_b` with log joints `joint_a` and `joint_b`.
pub fn swap_log_acceptance(heat_a: f64, joint_a: f64, heat_b: f64, joint_b: f64) -> f64 {
    ((heat_a - heat_b) * (joint_b - joint_a)).min(0.0)
}

/// Decides a swap with one uniform draw.
pub fn attempt_swap(
    heat_a: f64,
    joint_a: f64,
    heat_b: f64,
    joint_b: f64,
    rng: &mut RngHandle,
) -> (bool, f64) {
    let log_accept = swap_log_acceptance(heat_a, joint_a, heat_b, joint_b);
    let accepted = log_accept >= 0.0 || rng.uniform().ln() < log_accept;
    (accepted, log_accept.exp())
}
