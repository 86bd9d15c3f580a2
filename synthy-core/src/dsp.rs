//! Math backend and small pitch/level helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Side-effect free helpers that are easy to test
//!
//! Everything here works in `f64`: generator phase accumulates over very long
//! runs and single precision drifts audibly after a few minutes.

use core::f64::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // libm (C math) in no_std
    if #[cfg(feature = "no-std")] {
        #[inline] pub(crate) fn m_sin(x: f64) -> f64 { libm::sin(x) }
        #[inline] pub(crate) fn m_floor(x: f64) -> f64 { libm::floor(x) }
        #[inline] pub(crate) fn m_exp(x: f64) -> f64 { libm::exp(x) }
        #[inline] pub(crate) fn m_exp2(x: f64) -> f64 { libm::exp2(x) }
        #[inline] pub(crate) fn m_abs(x: f64) -> f64 { libm::fabs(x) }
    // std backend
    } else {
        #[inline] pub(crate) fn m_sin(x: f64) -> f64 { x.sin() }
        #[inline] pub(crate) fn m_floor(x: f64) -> f64 { x.floor() }
        #[inline] pub(crate) fn m_exp(x: f64) -> f64 { x.exp() }
        #[inline] pub(crate) fn m_exp2(x: f64) -> f64 { x.exp2() }
        #[inline] pub(crate) fn m_abs(x: f64) -> f64 { x.abs() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π, the period of the trigonometric wave shapes.
pub const TAU: f64 = 2.0 * PI;

/// A very small epsilon used in denormal handling.
pub const EPS_SMALL: f64 = 1.0e-30;

/// MIDI note number of A4.
pub const A4_NOTE: u8 = 69;

/// Frequency of A4 in Hz.
pub const A4_HZ: f64 = 440.0;

// --------------------------------- Utilities -------------------------------------

/// Clamp into `[-1, 1]`.
#[inline]
pub fn clip(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f64) -> f64 {
    if m_abs(x) < EPS_SMALL { 0.0 } else { x }
}

/// Equal-temperament pitch of a MIDI note: `440 * 2^((note - 69) / 12)`.
#[inline]
pub fn frequency_for_note(note: u8) -> f64 {
    A4_HZ * m_exp2((f64::from(note) - f64::from(A4_NOTE)) / 12.0)
}

/// Normalized MIDI velocity in `[0, 1]`.
#[inline]
pub fn velocity_gain(velocity: u8) -> f64 {
    f64::from(velocity.min(127)) / 127.0
}

/// One-pole smoothing coefficient for the `y += a * (x - y)` form at cutoff `cut_hz`:
/// `a = 1 - exp(-2π fc / sr)`.
#[inline]
pub fn one_pole_alpha_hz(cut_hz: f64, sample_rate: f64) -> f64 {
    let sr = sample_rate.max(1.0);
    let fc = cut_hz.max(0.0).min(0.499 * sr);
    1.0 - m_exp(-TAU * fc / sr)
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn a4_is_440() {
        assert_relative_eq!(frequency_for_note(69), 440.0);
    }

    #[test]
    fn note_frequencies_follow_equal_temperament() {
        for n in 0..=127u8 {
            let expected = 440.0 * 2f64.powf((f64::from(n) - 69.0) / 12.0);
            assert_relative_eq!(frequency_for_note(n), expected, max_relative = 1e-12);
        }
        assert_relative_eq!(frequency_for_note(81), 880.0, max_relative = 1e-12);
        assert_relative_eq!(frequency_for_note(57), 220.0, max_relative = 1e-12);
    }

    #[test]
    fn clip_is_bounded() {
        for x in [-10.0, -1.0, -0.25, 0.0, 0.5, 1.0, 3.0] {
            let y = clip(x);
            assert!((-1.0..=1.0).contains(&y), "x={x} y={y}");
        }
    }

    #[test]
    fn velocity_gain_spans_unit_range() {
        assert_relative_eq!(velocity_gain(0), 0.0);
        assert_relative_eq!(velocity_gain(127), 1.0);
        assert_relative_eq!(velocity_gain(255), 1.0);
    }

    #[test]
    fn one_pole_alpha_is_in_unit_interval() {
        for hz in [0.0, 20.0, 1000.0, 20_000.0, 1.0e9] {
            let a = one_pole_alpha_hz(hz, 48_000.0);
            assert!((0.0..=1.0).contains(&a), "hz={hz} a={a}");
        }
    }
}
