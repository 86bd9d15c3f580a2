//! Filters: stateful single-sample processors chained after a generator.
//!
//! Goals
//! - `no_std`-friendly, allocation free per sample
//! - One persistent state value per filter, never shared between generators
//!
//! Contents
//! - `LowPass` : "RC-style" one-pole low-pass, `y += α * (x - y)`
//! - `Filter`  : closed set of filter kinds a generator can carry
//! - `apply`   : fold a value through a filter chain in order
//!
//! Notes
//! - `LowPass` takes its smoothing factor `α` directly. `α = 1` passes the
//!   input through unchanged, smaller values smooth harder.
//!   `LowPass::from_cutoff` derives `α = 1 - exp(-2π fc / sr)` when a cutoff
//!   in Hz is more convenient.

use crate::dsp::{kill_denormals, one_pole_alpha_hz};
use core::fmt::Debug;

/// Smallest accepted smoothing factor.
const MIN_ALPHA: f64 = 1.0e-6;

/// One-pole low-pass `y += α * (x - y)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LowPass {
    alpha: f64,
    last_output: f64,
}

impl LowPass {
    /// Create a low-pass with smoothing factor `alpha`, clamped into `(0, 1]`.
    #[inline]
    pub fn new(alpha: f64) -> Self {
        Self { alpha: clamp_alpha(alpha), last_output: 0.0 }
    }

    /// Create a low-pass from a cutoff in Hz at the given sample rate.
    #[inline]
    pub fn from_cutoff(cut_hz: f64, sample_rate: f64) -> Self {
        Self::new(one_pole_alpha_hz(cut_hz, sample_rate))
    }

    #[inline] pub fn alpha(&self) -> f64 { self.alpha }
    #[inline] pub fn set_alpha(&mut self, alpha: f64) { self.alpha = clamp_alpha(alpha); }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        self.last_output = kill_denormals(self.last_output + self.alpha * (x - self.last_output));
        self.last_output
    }

    #[inline] pub fn value(&self) -> f64 { self.last_output }
    #[inline] pub fn reset(&mut self) { self.last_output = 0.0; }
}

#[inline]
fn clamp_alpha(alpha: f64) -> f64 {
    if alpha.is_nan() { 1.0 } else { alpha.clamp(MIN_ALPHA, 1.0) }
}

/// A filter a generator can carry in its chain.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Filter {
    LowPass(LowPass),
}

impl Filter {
    /// Convenience constructor for `Filter::LowPass(LowPass::new(alpha))`.
    #[inline]
    pub fn low_pass(alpha: f64) -> Self {
        Filter::LowPass(LowPass::new(alpha))
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        match self {
            Filter::LowPass(lp) => lp.process(x),
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        match self {
            Filter::LowPass(lp) => lp.reset(),
        }
    }
}

impl From<LowPass> for Filter {
    fn from(lp: LowPass) -> Self {
        Filter::LowPass(lp)
    }
}

/// Run `value` through every filter in order; returns the output of the last one.
#[inline]
pub fn apply(value: f64, filters: &mut [Filter]) -> f64 {
    filters.iter_mut().fold(value, |acc, f| f.process(acc))
}

// ------------------------------------ Tests --------------------------------------
