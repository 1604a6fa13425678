//! Discretized time grid and half-step lengths.
//!
//! Node ages are indices into `times`. Half-step `h` runs from `times2[h]` to
//! `times2[h + 1]`, where even entries of `times2` are the time points and odd
//! entries are midpoints between consecutive points. The last half-step is
//! unbounded.

use arg_core::{ArgError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Default curvature of log-spaced grids.
pub const DEFAULT_DELTA: f64 = 0.01;

const LOG_DELTA_MIN: f64 = -10.0;
const LOG_DELTA_MAX: f64 = 10.0;
const LOG_DELTA_TOL: f64 = 1e-10;

/// Returns the `i`-th of `ntimes + 1` log-spaced points between 0 and `maxtime`.
pub fn get_time_point(i: usize, ntimes: usize, maxtime: f64, delta: f64) -> f64 {
    ((i as f64 / ntimes as f64) * (1.0 + delta * maxtime).ln()).exp_m1() / delta
}

/// How the time points were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimeSpacing {
    /// Log-spaced points up to `maxtime`.
    Log {
        /// Oldest time point.
        maxtime: f64,
        /// Curvature recovered from the points by bisection.
        delta: f64,
    },
    /// Evenly spaced points.
    Linear {
        /// Distance between consecutive points.
        step: f64,
    },
    /// User supplied points.
    Explicit,
}

/// Discretized time grid shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeModel {
    spacing: TimeSpacing,
    times: Vec<f64>,
    coal_time_steps: Vec<f64>,
}

impl TimeModel {
    /// Log-spaced grid with the default curvature.
    pub fn log_spaced(maxtime: f64, ntimes: usize) -> Result<Self, ArgError> {
        Self::log_spaced_with_delta(maxtime, ntimes, DEFAULT_DELTA)
    }

    /// Log-spaced grid: `times[i] = (exp(i/(ntimes-1) * ln(1 + delta*maxtime)) - 1) / delta`.
    pub fn log_spaced_with_delta(
        maxtime: f64,
        ntimes: usize,
        delta: f64,
    ) -> Result<Self, ArgError> {
        if ntimes < 3 {
            return Err(invalid(
                "ntimes-too-small",
                "log-spaced grids need at least three time points",
                "ntimes",
                ntimes,
            ));
        }
        if !(maxtime > 0.0 && maxtime.is_finite()) {
            return Err(invalid(
                "maxtime-invalid",
                "maxtime must be positive and finite",
                "maxtime",
                maxtime,
            ));
        }
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(invalid(
                "delta-invalid",
                "delta must be positive and finite",
                "delta",
                delta,
            ));
        }
        let times: Vec<f64> = (0..ntimes)
            .map(|i| get_time_point(i, ntimes - 1, maxtime, delta))
            .collect();
        let fitted = get_delta(&times, maxtime)?;
        let coal_time_steps = log_coal_time_steps(&times, maxtime, fitted)?;
        Ok(Self {
            spacing: TimeSpacing::Log {
                maxtime,
                delta: fitted,
            },
            times,
            coal_time_steps,
        })
    }

    /// Evenly spaced grid `0, step, 2 step, ...`.
    pub fn linear(step: f64, ntimes: usize) -> Result<Self, ArgError> {
        if ntimes < 2 {
            return Err(invalid(
                "ntimes-too-small",
                "time grids need at least two points",
                "ntimes",
                ntimes,
            ));
        }
        if !(step > 0.0 && step.is_finite()) {
            return Err(invalid(
                "time-step-invalid",
                "time step must be positive and finite",
                "step",
                step,
            ));
        }
        let times: Vec<f64> = (0..ntimes).map(|i| i as f64 * step).collect();
        let coal_time_steps = linear_coal_time_steps(&times)?;
        Ok(Self {
            spacing: TimeSpacing::Linear { step },
            times,
            coal_time_steps,
        })
    }

    /// Grid from explicit points, which must start at zero and strictly increase.
    pub fn from_times(times: Vec<f64>) -> Result<Self, ArgError> {
        if times.len() < 2 {
            return Err(invalid(
                "ntimes-too-small",
                "time grids need at least two points",
                "ntimes",
                times.len(),
            ));
        }
        if times[0] != 0.0 {
            return Err(invalid(
                "times-origin",
                "the first time point must be zero",
                "first",
                times[0],
            ));
        }
        if let Some(i) =
            (1..times.len()).find(|&i| !(times[i] > times[i - 1]) || !times[i].is_finite())
        {
            return Err(invalid(
                "times-not-increasing",
                "time points must strictly increase",
                "index",
                i,
            ));
        }
        let coal_time_steps = linear_coal_time_steps(&times)?;
        Ok(Self {
            spacing: TimeSpacing::Explicit,
            times,
            coal_time_steps,
        })
    }

    /// How the grid was built.
    pub fn spacing(&self) -> &TimeSpacing {
        &self.spacing
    }

    /// Number of time points.
    pub fn ntimes(&self) -> usize {
        self.times.len()
    }

    /// Time points, strictly increasing from zero.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Time of point `i`.
    pub fn time(&self, i: usize) -> f64 {
        self.times[i]
    }

    /// Oldest time point.
    pub fn maxtime(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Half-step lengths; `2 * ntimes - 1` entries, the last infinite.
    pub fn coal_time_steps(&self) -> &[f64] {
        &self.coal_time_steps
    }

    /// Number of half-steps.
    pub fn nsteps(&self) -> usize {
        self.coal_time_steps.len()
    }

    /// Length of the interval between point `k` and point `k + 1`
    /// (zero for the oldest point).
    pub fn interval(&self, k: usize) -> f64 {
        if k + 1 < self.times.len() {
            self.times[k + 1] - self.times[k]
        } else {
            0.0
        }
    }

    /// Index of the time point equal to `t` up to rounding, if any.
    pub fn index_of(&self, t: f64) -> Option<usize> {
        let tol = 1e-6 * t.abs().max(1.0);
        let idx = self.times.partition_point(|&x| x < t - tol);
        (idx < self.times.len() && (self.times[idx] - t).abs() <= tol).then_some(idx)
    }
}

fn invalid(code: &str, message: &str, key: &str, value: impl ToString) -> ArgError {
    ArgError::Config(ErrorInfo::new(code, message).with_context(key, value.to_string()))
}

/// Recovers the curvature `delta` of a log-spaced grid by bisection on
/// `ln(delta)` so that the second generated point matches `times[1]`.
pub fn get_delta(times: &[f64], maxtime: f64) -> Result<f64, ArgError> {
    if times.len() < 3 {
        return Err(ArgError::Config(
            ErrorInfo::new("delta-ntimes", "delta recovery needs at least three time points")
                .with_context("ntimes", times.len().to_string()),
        ));
    }
    let n = times.len() - 1;
    let target = times[1];
    let diff = |log_delta: f64| get_time_point(1, n, maxtime, log_delta.exp()) - target;

    let mut lo = LOG_DELTA_MIN;
    let mut hi = LOG_DELTA_MAX;
    let mut lo_diff = diff(lo);
    let hi_diff = diff(hi);
    if !(lo_diff * hi_diff < 0.0) {
        return Err(ArgError::Config(
            ErrorInfo::new("delta-bracket", "bisection bounds do not bracket the time grid")
                .with_context("log_delta_min", LOG_DELTA_MIN.to_string())
                .with_context("log_delta_max", LOG_DELTA_MAX.to_string())
                .with_context("times1", target.to_string())
                .with_hint("use linear or explicit time points for this grid"),
        ));
    }
    while hi - lo > LOG_DELTA_TOL {
        let mid = 0.5 * (lo + hi);
        let mid_diff = diff(mid);
        if mid_diff == 0.0 {
            return Ok(mid.exp());
        }
        if (mid_diff < 0.0) == (lo_diff < 0.0) {
            lo = mid;
            lo_diff = mid_diff;
        } else {
            hi = mid;
        }
    }
    Ok((0.5 * (lo + hi)).exp())
}

fn log_coal_time_steps(times: &[f64], maxtime: f64, delta: f64) -> Result<Vec<f64>, ArgError> {
    let ntimes = times.len();
    let mut times2 = Vec::with_capacity(2 * ntimes - 1);
    for i in 0..ntimes {
        times2.push(times[i]);
        if i + 1 < ntimes {
            times2.push(get_time_point(2 * i + 1, 2 * ntimes - 2, maxtime, delta));
        }
    }
    steps_from_grid(&times2)
}

fn linear_coal_time_steps(times: &[f64]) -> Result<Vec<f64>, ArgError> {
    let ntimes = times.len();
    let mut times2 = Vec::with_capacity(2 * ntimes - 1);
    for i in 0..ntimes {
        times2.push(times[i]);
        if i + 1 < ntimes {
            times2.push(0.5 * (times[i] + times[i + 1]));
        }
    }
    steps_from_grid(&times2)
}

fn steps_from_grid(times2: &[f64]) -> Result<Vec<f64>, ArgError> {
    let mut steps: Vec<f64> = times2.windows(2).map(|w| w[1] - w[0]).collect();
    if let Some(h) = steps.iter().position(|&s| s < 0.0 || !s.is_finite()) {
        return Err(ArgError::Config(
            ErrorInfo::new("negative-half-step", "half-step lengths must be non-negative")
                .with_context("half_step", h.to_string())
                .with_context("length", steps[h].to_string()),
        ));
    }
    steps.push(f64::INFINITY);
    Ok(steps)
}
